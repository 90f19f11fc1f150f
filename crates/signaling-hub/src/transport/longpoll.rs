//! Long-poll fallback transport.
//!
//! For clients that cannot hold a WebSocket open:
//!
//! - `POST /longpoll/connect` establishes a connection and returns its id
//! - `GET  /longpoll/{id}/events` waits (bounded) and drains queued events
//! - `POST /longpoll/{id}/events` submits one envelope or an array of them
//!
//! The connection's send-queue is the same kind the WebSocket transport
//! uses; the receiver half is parked here between polls, which is what
//! lets `GET /ws?connectionId=<id>` upgrade the connection in place.

use super::emitter::OutboundFrame;
use super::TransportState;
use crate::events::ClientEvent;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

/// How long a poll waits for the first event before returning empty.
const POLL_WAIT: Duration = Duration::from_secs(25);

/// Why a receiver checkout failed.
#[derive(Debug, PartialEq, Eq)]
pub enum CheckoutError {
    /// No long-poll connection with that id.
    NotFound,
    /// Another poll currently holds the receiver.
    Busy,
}

#[derive(Debug, Default)]
struct Slot {
    /// Parked between polls; `None` while a poll holds it.
    receiver: Option<mpsc::UnboundedReceiver<OutboundFrame>>,
}

/// Parking registry for long-poll connections.
#[derive(Debug, Default)]
pub struct LongPollRegistry {
    slots: Mutex<HashMap<String, Slot>>,
}

impl LongPollRegistry {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn create(&self, connection_id: &str, receiver: mpsc::UnboundedReceiver<OutboundFrame>) {
        self.table().insert(
            connection_id.to_string(),
            Slot {
                receiver: Some(receiver),
            },
        );
    }

    #[must_use]
    pub fn contains(&self, connection_id: &str) -> bool {
        self.table().contains_key(connection_id)
    }

    /// Remove the slot entirely and hand its receiver out, if parked.
    /// Used by the WebSocket upgrade path.
    pub fn take_receiver(
        &self,
        connection_id: &str,
    ) -> Option<mpsc::UnboundedReceiver<OutboundFrame>> {
        self.table().remove(connection_id)?.receiver
    }

    /// Borrow the receiver for one poll; the slot stays, marked busy.
    pub fn checkout(
        &self,
        connection_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<OutboundFrame>, CheckoutError> {
        let mut table = self.table();
        let slot = table.get_mut(connection_id).ok_or(CheckoutError::NotFound)?;
        slot.receiver.take().ok_or(CheckoutError::Busy)
    }

    /// Park the receiver again after a poll. A concurrent upgrade may have
    /// removed the slot; in that case the receiver is dropped here and the
    /// upgrade owns the connection.
    pub fn checkin(&self, connection_id: &str, receiver: mpsc::UnboundedReceiver<OutboundFrame>) {
        if let Some(slot) = self.table().get_mut(connection_id) {
            slot.receiver = Some(receiver);
        }
    }

    pub fn remove(&self, connection_id: &str) {
        self.table().remove(connection_id);
    }
}

pub async fn connect_handler(State(state): State<TransportState>) -> impl IntoResponse {
    let connection_id = Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::unbounded_channel();
    state.emitter.register(&connection_id, tx);
    state.longpoll.create(&connection_id, rx);

    if state.hub.connected(connection_id.clone()).await.is_err() {
        state.longpoll.remove(&connection_id);
        state.emitter.unregister(&connection_id);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    info!(
        target: "hub.transport",
        connection_id = %connection_id,
        "Long-poll connection established"
    );
    Json(json!({ "connectionId": connection_id })).into_response()
}

pub async fn poll_handler(
    Path(connection_id): Path<String>,
    State(state): State<TransportState>,
) -> impl IntoResponse {
    let mut receiver = match state.longpoll.checkout(&connection_id) {
        Ok(receiver) => receiver,
        Err(CheckoutError::NotFound) => return StatusCode::NOT_FOUND.into_response(),
        Err(CheckoutError::Busy) => return StatusCode::CONFLICT.into_response(),
    };

    let mut events: Vec<Value> = Vec::new();
    let mut closed = false;

    match tokio::time::timeout(POLL_WAIT, receiver.recv()).await {
        Ok(Some(frame)) => collect(frame, &mut events, &mut closed),
        Ok(None) => closed = true,
        Err(_) => {}
    }
    while !closed {
        match receiver.try_recv() {
            Ok(frame) => collect(frame, &mut events, &mut closed),
            Err(_) => break,
        }
    }

    if closed {
        state.longpoll.remove(&connection_id);
        state.emitter.unregister(&connection_id);
        let _ = state.hub.disconnected(connection_id.clone()).await;
        debug!(
            target: "hub.transport",
            connection_id = %connection_id,
            "Long-poll connection closed"
        );
    } else {
        state.longpoll.checkin(&connection_id, receiver);
    }

    Json(json!({ "events": events, "closed": closed })).into_response()
}

pub async fn submit_handler(
    Path(connection_id): Path<String>,
    State(state): State<TransportState>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    if !state.longpoll.contains(&connection_id) {
        return StatusCode::NOT_FOUND;
    }

    let envelopes = match body {
        Value::Array(list) => list,
        other => vec![other],
    };

    for envelope in envelopes {
        match ClientEvent::parse(&envelope.to_string()) {
            Ok(Some(event)) => {
                if state
                    .hub
                    .inbound(connection_id.clone(), event)
                    .await
                    .is_err()
                {
                    return StatusCode::SERVICE_UNAVAILABLE;
                }
            }
            Ok(None) => {}
            Err(_) => return StatusCode::BAD_REQUEST,
        }
    }

    StatusCode::ACCEPTED
}

fn collect(frame: OutboundFrame, events: &mut Vec<Value>, closed: &mut bool) {
    match frame {
        OutboundFrame::Event(text) => {
            if let Ok(value) = serde_json::from_str(&text) {
                events.push(value);
            }
        }
        OutboundFrame::Close => *closed = true,
    }
}
