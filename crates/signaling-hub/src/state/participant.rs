//! Participant records and their wire representation.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Presence status of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
}

/// Room-level identity backed by one connection.
///
/// Created on a successful `join-room`; destroyed on disconnect,
/// duplicate-session preemption, stale purge, or host removal.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Connection id backing this participant (unique per connection).
    pub connection_id: String,
    /// Display name (unique among live participants, enforced on join).
    pub name: String,
    /// Room this participant belongs to.
    pub room_id: String,
    /// Authenticated user id, when the client supplied one.
    pub user_id: Option<String>,
    /// Join timestamp.
    pub joined_at: DateTime<Utc>,
    /// Last observed activity (join, inbound event, pong).
    pub last_seen: DateTime<Utc>,
    /// Presence status.
    pub presence: Presence,
    /// Audio muted flag.
    pub is_muted: bool,
    /// Video disabled flag.
    pub is_video_off: bool,
    /// Host role flag; at most one per room.
    pub is_host: bool,
    /// Raised-hand flag.
    pub is_raise_hand: bool,
}

impl Participant {
    /// Create a fresh record for a joining connection.
    #[must_use]
    pub fn new(connection_id: String, name: String, room_id: String, user_id: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            connection_id,
            name,
            room_id,
            user_id,
            joined_at: now,
            last_seen: now,
            presence: Presence::Online,
            is_muted: false,
            is_video_off: false,
            is_host: false,
            is_raise_hand: false,
        }
    }

    /// Wire-facing summary used by `user-joined` and `current-participants`.
    #[must_use]
    pub fn summary(&self) -> ParticipantSummary {
        ParticipantSummary {
            id: self.connection_id.clone(),
            name: self.name.clone(),
            is_muted: self.is_muted,
            is_video_off: self.is_video_off,
            is_host: self.is_host,
            is_raise_hand: self.is_raise_hand,
        }
    }
}

/// Fixed wire shape: `{id, name, isMuted, isVideoOff, isHost, isRaiseHand}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    pub id: String,
    pub name: String,
    pub is_muted: bool,
    pub is_video_off: bool,
    pub is_host: bool,
    pub is_raise_hand: bool,
}
