//! Mailbox messages for the hub engine task.

use crate::events::ClientEvent;
use crate::monitor::HealthSnapshot;
use crate::state::ParticipantSummary;
use serde::Serialize;
use tokio::sync::oneshot;

/// Messages processed by the engine task.
#[derive(Debug)]
pub enum HubMessage {
    /// A transport connection was established and its send-queue registered.
    Connected { connection_id: String },

    /// A decoded inbound event from one connection.
    Inbound {
        connection_id: String,
        event: ClientEvent,
    },

    /// The transport for a connection is gone.
    Disconnected { connection_id: String },

    /// A health monitor reporting its latest snapshot.
    HealthReport {
        connection_id: String,
        snapshot: HealthSnapshot,
    },

    /// Stale-connection sweep trigger.
    Sweep { reason: SweepReason },

    /// Operator stats snapshot.
    GetStats { respond_to: oneshot::Sender<HubStats> },

    /// Room inspection (tests, stats detail).
    GetRoom {
        room_id: String,
        respond_to: oneshot::Sender<Option<RoomSnapshot>>,
    },

    /// Graceful shutdown: broadcast recovery hint, drain, force-close.
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Why a sweep was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepReason {
    /// The periodic timer fired.
    Interval,
    /// Resident memory crossed the configured threshold.
    MemoryPressure,
}

impl SweepReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SweepReason::Interval => "interval",
            SweepReason::MemoryPressure => "memory-pressure",
        }
    }
}

/// Operator-facing snapshot served by `GET /stats`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub hub_id: String,
    pub participants: usize,
    pub rooms: usize,
    pub connections: usize,
    pub uptime_seconds: u64,
}

/// Point-in-time view of one room.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    /// Members in insertion order.
    pub members: Vec<ParticipantSummary>,
    /// Current host connection id.
    pub host: Option<String>,
}
