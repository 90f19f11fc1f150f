//! Signaling hub error types.
//!
//! Join rejections surface on the originating connection as `join-error`
//! events; everything else is either logged server-side or intentionally
//! silent (authorization failures never leak capability state to clients).

use thiserror::Error;

/// Reasons a `join-room` request is rejected.
///
/// Each variant maps to the exact message carried by the `join-error`
/// event; the connection stays open after a rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum JoinRejection {
    /// Total participant count has reached the process-wide ceiling.
    #[error("Server at capacity")]
    ServerAtCapacity,

    /// Room id absent, empty, or not a string.
    #[error("Invalid room ID")]
    InvalidRoomId,

    /// Display name absent, empty, not a string, or shaped like a room id.
    #[error("Invalid user name")]
    InvalidUserName,

    /// The target room is at its member ceiling after cleanup.
    #[error("Room is full")]
    RoomFull,
}

impl JoinRejection {
    /// The message clients see in `join-error{message}`.
    #[must_use]
    pub fn client_message(&self) -> String {
        self.to_string()
    }
}

/// Signaling hub error type.
#[derive(Debug, Error)]
pub enum HubError {
    /// Configuration error at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A `join-room` request was rejected (already answered on the wire).
    #[error("Join rejected: {0}")]
    Join(JoinRejection),

    /// Referenced connection has no participant record.
    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    /// Caller lacks the host role for the attempted action.
    /// Never emitted to clients; handlers drop the event silently.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Hub is draining (graceful shutdown in progress).
    #[error("Hub is draining")]
    Draining,

    /// Internal error (channel failures, poisoned state).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<JoinRejection> for HubError {
    fn from(rejection: JoinRejection) -> Self {
        HubError::Join(rejection)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_join_rejection_messages_match_wire_contract() {
        assert_eq!(
            JoinRejection::ServerAtCapacity.client_message(),
            "Server at capacity"
        );
        assert_eq!(JoinRejection::RoomFull.client_message(), "Room is full");
        assert!(JoinRejection::InvalidRoomId.client_message().starts_with("Invalid"));
        assert!(JoinRejection::InvalidUserName.client_message().starts_with("Invalid"));
    }

    #[test]
    fn test_join_rejection_converts_to_hub_error() {
        let err: HubError = JoinRejection::RoomFull.into();
        assert!(matches!(err, HubError::Join(JoinRejection::RoomFull)));
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", HubError::ParticipantNotFound("conn-1".to_string())),
            "Participant not found: conn-1"
        );
        assert_eq!(format!("{}", HubError::Draining), "Hub is draining");
    }
}
