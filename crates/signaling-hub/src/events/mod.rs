//! Wire surface: named events with JSON payloads.
//!
//! Frames are JSON envelopes of the form `{"event": <name>, "data": <payload>}`.
//! [`inbound`] validates client frames at the boundary into typed payloads
//! (unknown event names are dropped); [`outbound`] builds the fixed payload
//! shapes the hub emits.

pub mod inbound;
pub mod outbound;

pub use inbound::{ClientEvent, DecodeError};
pub use outbound::ServerEvent;

/// Current wall-clock time in epoch milliseconds, as carried on the wire.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
