//! Inbound event decoding and boundary validation.
//!
//! Each named event has a fixed schema; payloads are validated here and
//! strongly-typed values flow inward. Events whose payloads are opaque to
//! the engine (polls, whiteboard, files, Q&A, lock toggles) keep their raw
//! JSON value. Unknown event names decode to `None` and are dropped.

use crate::errors::JoinRejection;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Frame-level envelope: `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame is not a JSON envelope.
    #[error("Malformed envelope: {0}")]
    Envelope(serde_json::Error),

    /// The event is known but its payload does not match the schema.
    #[error("Malformed payload for '{event}': {source}")]
    Payload {
        event: &'static str,
        source: serde_json::Error,
    },
}

/// A decoded, boundary-validated client event.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    JoinRoom(JoinRoomPayload),
    Offer(OfferPayload),
    Answer(AnswerPayload),
    IceCandidate(IceCandidatePayload),
    UserMuted(MutePayload),
    UserVideoToggled(VideoPayload),
    RaiseHandToggled(RaiseHandPayload),
    Reaction(Value),
    ChatMessage(Value),
    Typing(TypingPayload),
    HostMuteParticipant(HostMutePayload),
    HostToggleVideo(HostVideoPayload),
    HostRemoveParticipant(TargetPayload),
    HostTransfer(HostTransferPayload),
    RenameParticipant(RenamePayload),
    Ping(PingPayload),
    Pong(PingPayload),
    ReconnectRequest,
    StartBreakoutRooms(BreakoutStartPayload),
    EndBreakoutRooms(Value),
    CreatePoll(Value),
    VotePoll(Value),
    EndPoll(Value),
    WhiteboardDraw(Value),
    WhiteboardClear(Value),
    ShareFile(Value),
    DeleteFile(Value),
    AskQuestion(Value),
    UpvoteQuestion(Value),
    AnswerQuestion(Value),
    ToggleMeetingLock(Value),
    ToggleWaitingRoom(Value),
    ToggleScreenShareRestriction(Value),
    ToggleChatRestriction(Value),
    ScreenShareStarted(Value),
    ScreenShareStopped(Value),
    HostSpotlightParticipant(TargetPayload),
    HostRemoveSpotlight(Value),
    ErrorReport(ErrorPayload),
}

impl ClientEvent {
    /// Decode a text frame. `Ok(None)` means the event name is unknown and
    /// the frame should be dropped.
    pub fn parse(text: &str) -> Result<Option<Self>, DecodeError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(DecodeError::Envelope)?;
        Self::from_envelope(&envelope.event, envelope.data)
    }

    fn from_envelope(event: &str, data: Value) -> Result<Option<Self>, DecodeError> {
        fn typed<T: serde::de::DeserializeOwned>(
            event: &'static str,
            data: Value,
        ) -> Result<T, DecodeError> {
            serde_json::from_value(data).map_err(|source| DecodeError::Payload { event, source })
        }

        let decoded = match event {
            "join-room" => Self::JoinRoom(typed("join-room", data)?),
            "offer" => Self::Offer(typed("offer", data)?),
            "answer" => Self::Answer(typed("answer", data)?),
            "ice-candidate" => Self::IceCandidate(typed("ice-candidate", data)?),
            "user-muted" => Self::UserMuted(typed("user-muted", data)?),
            "user-video-toggled" => Self::UserVideoToggled(typed("user-video-toggled", data)?),
            "raise-hand-toggled" => Self::RaiseHandToggled(typed("raise-hand-toggled", data)?),
            "reaction" => Self::Reaction(data),
            "chat-message" => Self::ChatMessage(data),
            "typing" => Self::Typing(typed("typing", data)?),
            "host-mute-participant" => {
                Self::HostMuteParticipant(typed("host-mute-participant", data)?)
            }
            "host-toggle-video" => Self::HostToggleVideo(typed("host-toggle-video", data)?),
            "host-remove-participant" => {
                Self::HostRemoveParticipant(typed("host-remove-participant", data)?)
            }
            "host-transfer" => Self::HostTransfer(typed("host-transfer", data)?),
            "rename-participant" => Self::RenameParticipant(typed("rename-participant", data)?),
            "ping" => Self::Ping(typed("ping", data)?),
            "pong" => Self::Pong(typed("pong", data)?),
            "reconnect-request" => Self::ReconnectRequest,
            "start-breakout-rooms" => {
                Self::StartBreakoutRooms(typed("start-breakout-rooms", data)?)
            }
            "end-breakout-rooms" => Self::EndBreakoutRooms(data),
            "create-poll" => Self::CreatePoll(data),
            "vote-poll" => Self::VotePoll(data),
            "end-poll" => Self::EndPoll(data),
            "whiteboard-draw" => Self::WhiteboardDraw(data),
            "whiteboard-clear" => Self::WhiteboardClear(data),
            "share-file" => Self::ShareFile(data),
            "delete-file" => Self::DeleteFile(data),
            "ask-question" => Self::AskQuestion(data),
            "upvote-question" => Self::UpvoteQuestion(data),
            "answer-question" => Self::AnswerQuestion(data),
            "toggle-meeting-lock" => Self::ToggleMeetingLock(data),
            "toggle-waiting-room" => Self::ToggleWaitingRoom(data),
            "toggle-screen-share-restriction" => Self::ToggleScreenShareRestriction(data),
            "toggle-chat-restriction" => Self::ToggleChatRestriction(data),
            "screen-share-started" => Self::ScreenShareStarted(data),
            "screen-share-stopped" => Self::ScreenShareStopped(data),
            "host-spotlight-participant" => {
                Self::HostSpotlightParticipant(typed("host-spotlight-participant", data)?)
            }
            "host-remove-spotlight" => Self::HostRemoveSpotlight(data),
            "error" => Self::ErrorReport(typed("error", data)?),
            _ => return Ok(None),
        };
        Ok(Some(decoded))
    }

    /// Event name, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinRoom(_) => "join-room",
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::IceCandidate(_) => "ice-candidate",
            Self::UserMuted(_) => "user-muted",
            Self::UserVideoToggled(_) => "user-video-toggled",
            Self::RaiseHandToggled(_) => "raise-hand-toggled",
            Self::Reaction(_) => "reaction",
            Self::ChatMessage(_) => "chat-message",
            Self::Typing(_) => "typing",
            Self::HostMuteParticipant(_) => "host-mute-participant",
            Self::HostToggleVideo(_) => "host-toggle-video",
            Self::HostRemoveParticipant(_) => "host-remove-participant",
            Self::HostTransfer(_) => "host-transfer",
            Self::RenameParticipant(_) => "rename-participant",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::ReconnectRequest => "reconnect-request",
            Self::StartBreakoutRooms(_) => "start-breakout-rooms",
            Self::EndBreakoutRooms(_) => "end-breakout-rooms",
            Self::CreatePoll(_) => "create-poll",
            Self::VotePoll(_) => "vote-poll",
            Self::EndPoll(_) => "end-poll",
            Self::WhiteboardDraw(_) => "whiteboard-draw",
            Self::WhiteboardClear(_) => "whiteboard-clear",
            Self::ShareFile(_) => "share-file",
            Self::DeleteFile(_) => "delete-file",
            Self::AskQuestion(_) => "ask-question",
            Self::UpvoteQuestion(_) => "upvote-question",
            Self::AnswerQuestion(_) => "answer-question",
            Self::ToggleMeetingLock(_) => "toggle-meeting-lock",
            Self::ToggleWaitingRoom(_) => "toggle-waiting-room",
            Self::ToggleScreenShareRestriction(_) => "toggle-screen-share-restriction",
            Self::ToggleChatRestriction(_) => "toggle-chat-restriction",
            Self::ScreenShareStarted(_) => "screen-share-started",
            Self::ScreenShareStopped(_) => "screen-share-stopped",
            Self::HostSpotlightParticipant(_) => "host-spotlight-participant",
            Self::HostRemoveSpotlight(_) => "host-remove-spotlight",
            Self::ErrorReport(_) => "error",
        }
    }
}

/// `join-room` payload. Fields stay loose (`Value`) so the handler can
/// answer shape violations with `join-error` instead of dropping the frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomPayload {
    #[serde(default)]
    pub room_id: Value,
    #[serde(default)]
    pub user_name: Value,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl JoinRoomPayload {
    /// Validate shape and the name-vs-room-id heuristic.
    ///
    /// Returns `(room_id, user_name)` or the rejection to surface as
    /// `join-error`. A name that contains `-` and is longer than 10
    /// characters is taken for a pasted room id and refused.
    pub fn validate(&self) -> Result<(String, String), JoinRejection> {
        let room_id = match self.room_id.as_str() {
            Some(s) if !s.trim().is_empty() => s.to_string(),
            _ => return Err(JoinRejection::InvalidRoomId),
        };
        let user_name = match self.user_name.as_str() {
            Some(s) if !s.trim().is_empty() => s.to_string(),
            _ => return Err(JoinRejection::InvalidUserName),
        };
        if user_name.contains('-') && user_name.len() > 10 {
            return Err(JoinRejection::InvalidUserName);
        }
        Ok((room_id, user_name))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferPayload {
    #[serde(default)]
    pub offer: Value,
    pub target_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    #[serde(default)]
    pub answer: Value,
    pub target_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidatePayload {
    #[serde(default)]
    pub candidate: Value,
    pub target_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutePayload {
    /// Defaults to the sender when absent.
    #[serde(default)]
    pub participant_id: Option<String>,
    pub is_muted: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoPayload {
    #[serde(default)]
    pub participant_id: Option<String>,
    pub is_video_off: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaiseHandPayload {
    #[serde(default)]
    pub participant_id: Option<String>,
    pub is_raise_hand: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    #[serde(default)]
    pub is_typing: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMutePayload {
    pub participant_id: String,
    pub is_muted: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostVideoPayload {
    pub participant_id: String,
    pub is_video_off: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetPayload {
    pub participant_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostTransferPayload {
    pub new_host_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamePayload {
    /// Defaults to the sender when absent.
    #[serde(default)]
    pub participant_id: Option<String>,
    pub new_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingPayload {
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: Option<String>,
}

/// `start-breakout-rooms` payload. The room definitions are echoed to the
/// parent room verbatim; only the per-room participant assignments are
/// interpreted by the engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakoutStartPayload {
    #[serde(default)]
    pub rooms: Value,
    #[serde(default)]
    pub duration: Value,
}

impl BreakoutStartPayload {
    /// Extract `(breakout_room_id, participant_ids)` assignments.
    ///
    /// A room entry is an object with `roomId` (or `id`) and a
    /// `participants` array of connection ids (plain strings or objects
    /// with an `id` field). Entries that do not match are skipped.
    #[must_use]
    pub fn assignments(&self) -> Vec<(String, Vec<String>)> {
        let Some(rooms) = self.rooms.as_array() else {
            return Vec::new();
        };
        rooms
            .iter()
            .filter_map(|room| {
                let room_id = room
                    .get("roomId")
                    .or_else(|| room.get("id"))
                    .and_then(Value::as_str)?
                    .to_string();
                let participants = room
                    .get("participants")
                    .and_then(Value::as_array)
                    .map(|entries| {
                        entries
                            .iter()
                            .filter_map(|entry| {
                                entry
                                    .as_str()
                                    .or_else(|| entry.get("id").and_then(Value::as_str))
                                    .map(String::from)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Some((room_id, participants))
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(event: &str, data: Value) -> Result<Option<ClientEvent>, DecodeError> {
        ClientEvent::parse(&json!({ "event": event, "data": data }).to_string())
    }

    #[test]
    fn test_unknown_event_is_dropped() {
        let decoded = parse("no-such-event", json!({})).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_malformed_envelope_is_an_error() {
        assert!(matches!(
            ClientEvent::parse("not json"),
            Err(DecodeError::Envelope(_))
        ));
    }

    #[test]
    fn test_missing_data_defaults_to_null() {
        let decoded = ClientEvent::parse(r#"{"event":"reconnect-request"}"#).unwrap();
        assert!(matches!(decoded, Some(ClientEvent::ReconnectRequest)));
    }

    #[test]
    fn test_offer_payload_decodes() {
        let decoded = parse("offer", json!({ "offer": {"sdp": "X"}, "targetId": "conn-2" }))
            .unwrap()
            .unwrap();
        match decoded {
            ClientEvent::Offer(payload) => {
                assert_eq!(payload.target_id, "conn-2");
                assert_eq!(payload.offer["sdp"], "X");
            }
            other => panic!("unexpected event: {}", other.name()),
        }
    }

    #[test]
    fn test_offer_without_target_is_malformed() {
        let result = parse("offer", json!({ "offer": "X" }));
        assert!(matches!(
            result,
            Err(DecodeError::Payload { event: "offer", .. })
        ));
    }

    #[test]
    fn test_join_validate_accepts_plain_name() {
        let payload = JoinRoomPayload {
            room_id: json!("R1"),
            user_name: json!("Alice"),
            user_id: None,
        };
        let (room, name) = payload.validate().unwrap();
        assert_eq!(room, "R1");
        assert_eq!(name, "Alice");
    }

    #[test]
    fn test_join_validate_rejects_missing_fields() {
        let payload = JoinRoomPayload {
            room_id: Value::Null,
            user_name: json!("Alice"),
            user_id: None,
        };
        assert_eq!(payload.validate(), Err(JoinRejection::InvalidRoomId));

        let payload = JoinRoomPayload {
            room_id: json!("R1"),
            user_name: json!(42),
            user_id: None,
        };
        assert_eq!(payload.validate(), Err(JoinRejection::InvalidUserName));
    }

    #[test]
    fn test_join_validate_rejects_room_id_shaped_name() {
        let payload = JoinRoomPayload {
            room_id: json!("R1"),
            user_name: json!("a1b2c3-d4e5f6"),
            user_id: None,
        };
        assert_eq!(payload.validate(), Err(JoinRejection::InvalidUserName));

        // Short hyphenated names are fine.
        let payload = JoinRoomPayload {
            room_id: json!("R1"),
            user_name: json!("Jean-Luc"),
            user_id: None,
        };
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_breakout_assignments_accept_both_entry_shapes() {
        let payload = BreakoutStartPayload {
            rooms: json!([
                { "roomId": "bo-1", "participants": ["conn-1", { "id": "conn-2" }] },
                { "id": "bo-2", "participants": [] },
                { "participants": ["ignored"] },
            ]),
            duration: json!(300),
        };

        let assignments = payload.assignments();
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].0, "bo-1");
        assert_eq!(
            assignments[0].1,
            vec!["conn-1".to_string(), "conn-2".to_string()]
        );
        assert_eq!(assignments[1].0, "bo-2");
        assert!(assignments[1].1.is_empty());
    }

    #[test]
    fn test_opaque_events_keep_raw_payload() {
        let decoded = parse("create-poll", json!({ "question": "?", "options": ["a", "b"] }))
            .unwrap()
            .unwrap();
        match decoded {
            ClientEvent::CreatePoll(data) => assert_eq!(data["question"], "?"),
            other => panic!("unexpected event: {}", other.name()),
        }
    }
}
