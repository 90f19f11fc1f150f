//! Engine actor.
//!
//! The hub runs a single-writer task owning all room state. Every inbound
//! event becomes one mailbox message, so mutations to rooms, membership and
//! host assignments are serialized while transport I/O stays concurrent.

pub mod hub;
pub mod messages;

pub use hub::HubActorHandle;
pub use messages::{HubMessage, HubStats, RoomSnapshot, SweepReason};
