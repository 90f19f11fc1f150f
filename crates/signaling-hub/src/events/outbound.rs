//! Outbound event construction.
//!
//! A [`ServerEvent`] pairs an event name with its JSON payload and
//! serializes to the wire envelope once; fan-out reuses the serialized
//! frame for every destination. Fixed payload shapes get dedicated
//! constructors; opaque fan-outs go through [`ServerEvent::new`].

use crate::config::{EXPECTED_DOWNTIME_MS, SERVER_VERSION};
use crate::events::now_ms;
use crate::monitor::HealthSnapshot;
use crate::state::ParticipantSummary;
use chrono::Utc;
use serde_json::{json, Value};

/// A named outbound event with its payload.
#[derive(Debug, Clone)]
pub struct ServerEvent {
    pub name: &'static str,
    pub data: Value,
}

impl ServerEvent {
    /// An event whose payload is passed through opaquely.
    #[must_use]
    pub fn new(name: &'static str, data: Value) -> Self {
        Self { name, data }
    }

    /// Serialize to the wire envelope.
    #[must_use]
    pub fn frame(&self) -> String {
        json!({ "event": self.name, "data": self.data }).to_string()
    }

    #[must_use]
    pub fn connection_confirmed(socket_id: &str, features: &[String]) -> Self {
        Self::new(
            "connection-confirmed",
            json!({
                "socketId": socket_id,
                "timestamp": now_ms(),
                "serverTime": Utc::now().to_rfc3339(),
                "serverVersion": SERVER_VERSION,
                "features": features,
            }),
        )
    }

    #[must_use]
    pub fn user_joined(participant: &ParticipantSummary) -> Self {
        Self::new("user-joined", json!(participant))
    }

    #[must_use]
    pub fn current_participants(participants: &[ParticipantSummary]) -> Self {
        Self::new("current-participants", json!(participants))
    }

    #[must_use]
    pub fn participant_count(count: usize) -> Self {
        Self::new("participant-count", json!({ "count": count }))
    }

    #[must_use]
    pub fn user_left(participant_id: &str, user_name: &str, reason: &str) -> Self {
        Self::new(
            "user-left",
            json!({
                "participantId": participant_id,
                "userName": user_name,
                "timestamp": now_ms(),
                "reason": reason,
            }),
        )
    }

    #[must_use]
    pub fn host_changed(
        new_host_id: &str,
        new_host_name: &str,
        previous_host_id: Option<&str>,
        participants: &[(String, bool)],
    ) -> Self {
        let roster: Vec<Value> = participants
            .iter()
            .map(|(id, is_host)| json!({ "id": id, "isHost": is_host }))
            .collect();
        Self::new(
            "host-changed",
            json!({
                "newHostId": new_host_id,
                "newHostName": new_host_name,
                "previousHostId": previous_host_id,
                "participants": roster,
            }),
        )
    }

    #[must_use]
    pub fn host_status_update(host_id: &str, host_name: &str) -> Self {
        Self::new(
            "host-status-update",
            json!({ "hostId": host_id, "hostName": host_name }),
        )
    }

    #[must_use]
    pub fn participant_renamed(participant_id: &str, old_name: &str, new_name: &str) -> Self {
        Self::new(
            "participant-renamed",
            json!({
                "participantId": participant_id,
                "oldName": old_name,
                "newName": new_name,
            }),
        )
    }

    #[must_use]
    pub fn pong(echo_timestamp: Option<i64>, health: Option<&HealthSnapshot>) -> Self {
        Self::new(
            "pong",
            json!({
                "timestamp": echo_timestamp,
                "serverTime": now_ms(),
                "health": health.map(|h| json!(h)),
            }),
        )
    }

    #[must_use]
    pub fn reconnect_response(
        user_data: Option<&ParticipantSummary>,
        health: Option<&HealthSnapshot>,
    ) -> Self {
        Self::new(
            "reconnect-response",
            json!({
                "success": true,
                "userData": user_data.map(|u| json!(u)),
                "connectionHealth": health.map(|h| json!(h)),
            }),
        )
    }

    #[must_use]
    pub fn server_shutdown(message: &str, recovery_data: Value) -> Self {
        Self::new(
            "server-shutdown",
            json!({
                "message": message,
                "timestamp": now_ms(),
                "recoveryData": recovery_data,
                "expectedDowntime": EXPECTED_DOWNTIME_MS,
            }),
        )
    }

    #[must_use]
    pub fn join_error(message: &str) -> Self {
        Self::new("join-error", json!({ "message": message }))
    }

    #[must_use]
    pub fn connection_recovery(message: &str) -> Self {
        Self::new(
            "connection-recovery",
            json!({ "message": message, "timestamp": now_ms() }),
        )
    }

    #[must_use]
    pub fn force_disconnect(reason: &str, message: &str) -> Self {
        Self::new(
            "force-disconnect",
            json!({ "reason": reason, "message": message }),
        )
    }

    #[must_use]
    pub fn participant_spotlighted(participant_id: &str) -> Self {
        Self::new(
            "participant-spotlighted",
            json!({ "participantId": participant_id }),
        )
    }

    #[must_use]
    pub fn spotlight_removed(participant_id: Option<&str>) -> Self {
        Self::new("spotlight-removed", json!({ "participantId": participant_id }))
    }

    #[must_use]
    pub fn assigned_to_breakout_room(room_id: &str) -> Self {
        Self::new("assigned-to-breakout-room", json!({ "roomId": room_id }))
    }
}

/// Enrich an opaque payload with engine-stamped fields.
///
/// Non-object payloads are wrapped under `"payload"` so the stamps always
/// have somewhere to live.
#[must_use]
pub fn with_fields(data: Value, fields: &[(&str, Value)]) -> Value {
    let mut object = match data {
        Value::Object(map) => map,
        Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("payload".to_string(), other);
            map
        }
    };
    for (key, value) in fields {
        object.insert((*key).to_string(), value.clone());
    }
    Value::Object(object)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_envelope_shape() {
        let event = ServerEvent::participant_count(3);
        let frame: Value = serde_json::from_str(&event.frame()).unwrap();
        assert_eq!(frame["event"], "participant-count");
        assert_eq!(frame["data"]["count"], 3);
    }

    #[test]
    fn test_connection_confirmed_shape() {
        let event =
            ServerEvent::connection_confirmed("conn-1", &["presence".to_string()]);
        assert_eq!(event.name, "connection-confirmed");
        assert_eq!(event.data["socketId"], "conn-1");
        assert_eq!(event.data["serverVersion"], SERVER_VERSION);
        assert!(event.data["timestamp"].is_i64());
        assert!(event.data["serverTime"].is_string());
        assert_eq!(event.data["features"][0], "presence");
    }

    #[test]
    fn test_user_left_shape() {
        let event = ServerEvent::user_left("conn-1", "Alice", "duplicate-session");
        assert_eq!(event.data["participantId"], "conn-1");
        assert_eq!(event.data["userName"], "Alice");
        assert_eq!(event.data["reason"], "duplicate-session");
        assert!(event.data["timestamp"].is_i64());
    }

    #[test]
    fn test_host_changed_roster() {
        let event = ServerEvent::host_changed(
            "b",
            "Bob",
            Some("a"),
            &[("b".to_string(), true), ("c".to_string(), false)],
        );
        assert_eq!(event.data["newHostId"], "b");
        assert_eq!(event.data["previousHostId"], "a");
        assert_eq!(event.data["participants"][0]["isHost"], true);
        assert_eq!(event.data["participants"][1]["id"], "c");
    }

    #[test]
    fn test_server_shutdown_carries_downtime_hint() {
        let event = ServerEvent::server_shutdown("restarting", json!({ "rooms": {} }));
        assert_eq!(event.data["expectedDowntime"], 30_000);
        assert_eq!(event.data["recoveryData"]["rooms"], json!({}));
    }

    #[test]
    fn test_with_fields_enriches_objects_and_wraps_scalars() {
        let enriched = with_fields(
            json!({ "emoji": "wave" }),
            &[("userName", json!("Alice"))],
        );
        assert_eq!(enriched["emoji"], "wave");
        assert_eq!(enriched["userName"], "Alice");

        let wrapped = with_fields(json!("plain"), &[("userName", json!("Alice"))]);
        assert_eq!(wrapped["payload"], "plain");
        assert_eq!(wrapped["userName"], "Alice");
    }
}
