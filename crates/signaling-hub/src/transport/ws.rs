//! WebSocket transport: the primary streaming channel.
//!
//! Each accepted socket gets an opaque connection id and two tasks: a
//! pusher draining the connection's send-queue into the socket, and a
//! receive loop decoding envelopes into engine messages. A connect
//! carrying `?connectionId=<existing>` upgrades a long-poll connection,
//! taking over its already-registered send-queue.

use super::emitter::OutboundFrame;
use super::TransportState;
use crate::events::ClientEvent;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Query parameters for the WebSocket endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    /// Present when upgrading an existing long-poll connection.
    #[serde(default)]
    pub connection_id: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<TransportState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let ws = ws.max_message_size(state.config.max_payload_bytes);

    match query.connection_id {
        Some(existing) => {
            // Upgrade path: adopt the long-poll connection's send-queue.
            let Some(receiver) = state.longpoll.take_receiver(&existing) else {
                return StatusCode::NOT_FOUND.into_response();
            };
            info!(
                target: "hub.transport",
                connection_id = %existing,
                "Long-poll connection upgrading to WebSocket"
            );
            ws.on_upgrade(move |socket| run_socket(socket, state, existing, receiver, false))
                .into_response()
        }
        None => {
            let connection_id = Uuid::new_v4().to_string();
            let (tx, rx) = mpsc::unbounded_channel();
            state.emitter.register(&connection_id, tx);
            ws.on_upgrade(move |socket| run_socket(socket, state, connection_id, rx, true))
                .into_response()
        }
    }
}

async fn run_socket(
    socket: WebSocket,
    state: TransportState,
    connection_id: String,
    outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    announce: bool,
) {
    // Fresh connections are announced so the engine confirms them and
    // starts their health monitor; upgrades keep their existing identity.
    if announce && state.hub.connected(connection_id.clone()).await.is_err() {
        state.emitter.unregister(&connection_id);
        return;
    }

    let (sender, mut receiver) = socket.split();
    let mut send_task = pusher_loop(outbound_rx, sender);

    let hub = state.hub.clone();
    let recv_connection_id = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(error) => {
                    debug!(
                        target: "hub.transport",
                        connection_id = %recv_connection_id,
                        error = %error,
                        "WebSocket receive error"
                    );
                    break;
                }
            };

            match msg {
                Message::Text(text) => match ClientEvent::parse(text.as_str()) {
                    Ok(Some(event)) => {
                        if hub
                            .inbound(recv_connection_id.clone(), event)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!(
                            target: "hub.transport",
                            connection_id = %recv_connection_id,
                            "Dropping unknown event"
                        );
                    }
                    Err(error) => {
                        warn!(
                            target: "hub.transport",
                            connection_id = %recv_connection_id,
                            error = %error,
                            "Dropping malformed frame"
                        );
                    }
                },
                Message::Close(_) => break,
                // Protocol-level ping/pong and binary frames are not part
                // of the event surface.
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    }

    state.emitter.unregister(&connection_id);
    let _ = state.hub.disconnected(connection_id.clone()).await;
    debug!(
        target: "hub.transport",
        connection_id = %connection_id,
        "WebSocket connection closed"
    );
}

/// Drain the connection's send-queue into the socket, preserving emit
/// order. A `Close` frame flushes a protocol close and ends the task.
fn pusher_loop(
    mut rx: mpsc::UnboundedReceiver<OutboundFrame>,
    mut sender: futures_util::stream::SplitSink<WebSocket, Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                OutboundFrame::Event(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                OutboundFrame::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    })
}
