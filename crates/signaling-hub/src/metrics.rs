//! Process-wide gauges shared between the engine and the supervisor tasks.
//!
//! The engine updates the counters as registries change; the lifecycle
//! supervisor reads them for the periodic health line, and the `/stats`
//! endpoint snapshots them for operators. All fields are atomic for
//! lock-free concurrent access.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared hub gauges.
#[derive(Debug, Default)]
pub struct HubMetrics {
    /// Live participant records across all rooms.
    participants: AtomicUsize,
    /// Rooms with at least one member.
    rooms: AtomicUsize,
    /// Open transport connections (joined or not).
    connections: AtomicUsize,
    /// Total inbound events dispatched.
    events_dispatched: AtomicU64,
}

/// Point-in-time snapshot of the hub gauges.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub participants: usize,
    pub rooms: usize,
    pub connections: usize,
    pub events_dispatched: u64,
}

impl HubMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_participants(&self, count: usize) {
        self.participants.store(count, Ordering::Relaxed);
    }

    pub fn set_rooms(&self, count: usize) {
        self.rooms.store(count, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_event_dispatched(&self) {
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn participants(&self) -> usize {
        self.participants.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn rooms(&self) -> usize {
        self.rooms.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Take a snapshot of the current gauges.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            participants: self.participants.load(Ordering::Relaxed),
            rooms: self.rooms.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
        }
    }
}
