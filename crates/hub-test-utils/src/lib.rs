//! In-process test harness for the signaling hub engine.
//!
//! Spawns the engine with an injected configuration and fabricates
//! connections whose send-queues are captured locally, so tests can drive
//! the full join/relay/moderation surface and assert on every emitted
//! event without binding sockets. Inbound frames go through the
//! production envelope decoder, keeping the wire contract under test.
//!
//! ```rust,ignore
//! let hub = TestHub::spawn();
//! let mut alice = hub.connect().await?;
//! alice.emit("join-room", json!({ "roomId": "R1", "userName": "Alice" })).await?;
//! hub.settle().await?;
//! let events = alice.take_events();
//! ```

use anyhow::{anyhow, Context};
use serde_json::{json, Value};
use signaling_hub::actors::{HubActorHandle, HubStats, RoomSnapshot};
use signaling_hub::config::Config;
use signaling_hub::events::ClientEvent;
use signaling_hub::metrics::HubMetrics;
use signaling_hub::transport::{Emitter, OutboundFrame};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A named event captured off a test connection's send-queue.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub name: String,
    pub data: Value,
}

/// One fabricated connection.
pub struct TestClient {
    pub connection_id: String,
    hub: HubActorHandle,
    rx: mpsc::UnboundedReceiver<OutboundFrame>,
    saw_close: bool,
}

impl TestClient {
    /// Send one envelope through the production decoder into the engine.
    ///
    /// Fails on unknown event names and malformed payloads, so tests
    /// cannot silently drive the hub with frames real clients could not.
    pub async fn emit(&self, event: &str, data: Value) -> anyhow::Result<()> {
        let frame = json!({ "event": event, "data": data }).to_string();
        let decoded = ClientEvent::parse(&frame)
            .context("frame failed to decode")?
            .ok_or_else(|| anyhow!("unknown event name: {event}"))?;
        self.hub
            .inbound(self.connection_id.clone(), decoded)
            .await
            .map_err(|e| anyhow!("engine rejected event: {e}"))
    }

    /// Drain everything currently queued, without waiting.
    pub fn take_events(&mut self) -> Vec<CapturedEvent> {
        let mut events = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            match frame {
                OutboundFrame::Event(text) => {
                    if let Ok(value) = serde_json::from_str::<Value>(&text) {
                        events.push(CapturedEvent {
                            name: value["event"].as_str().unwrap_or_default().to_string(),
                            data: value["data"].clone(),
                        });
                    }
                }
                OutboundFrame::Close => self.saw_close = true,
            }
        }
        events
    }

    /// Wait (bounded) for the next event.
    pub async fn next_event(&mut self) -> Option<CapturedEvent> {
        loop {
            let frame =
                tokio::time::timeout(Duration::from_secs(1), self.rx.recv()).await.ok()??;
            match frame {
                OutboundFrame::Event(text) => {
                    let value: Value = serde_json::from_str(&text).ok()?;
                    return Some(CapturedEvent {
                        name: value["event"].as_str().unwrap_or_default().to_string(),
                        data: value["data"].clone(),
                    });
                }
                OutboundFrame::Close => {
                    self.saw_close = true;
                }
            }
        }
    }

    /// Whether the engine instructed the transport to close this connection.
    #[must_use]
    pub fn saw_close(&mut self) -> bool {
        // A pending Close may still sit in the queue.
        let _ = self.take_events();
        self.saw_close
    }
}

/// The engine under test.
pub struct TestHub {
    pub handle: HubActorHandle,
    pub emitter: Arc<Emitter>,
    pub metrics: Arc<HubMetrics>,
    counter: AtomicUsize,
}

impl TestHub {
    /// Spawn with the default configuration.
    #[must_use]
    pub fn spawn() -> Self {
        Self::spawn_with(Config::default())
    }

    /// Spawn with an injected configuration (capacity limits, deadlines).
    #[must_use]
    pub fn spawn_with(config: Config) -> Self {
        let emitter = Emitter::new();
        let metrics = HubMetrics::new();
        let handle = HubActorHandle::new(
            Arc::new(config),
            Arc::clone(&emitter),
            Arc::clone(&metrics),
        );
        Self {
            handle,
            emitter,
            metrics,
            counter: AtomicUsize::new(0),
        }
    }

    /// Fabricate a connection and announce it to the engine.
    pub async fn connect(&self) -> anyhow::Result<TestClient> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let connection_id = format!("test-conn-{n}");
        let (tx, rx) = mpsc::unbounded_channel();
        self.emitter.register(&connection_id, tx);
        self.handle
            .connected(connection_id.clone())
            .await
            .map_err(|e| anyhow!("engine rejected connection: {e}"))?;
        Ok(TestClient {
            connection_id,
            hub: self.handle.clone(),
            rx,
            saw_close: false,
        })
    }

    /// Connect and join in one step, draining the setup events.
    pub async fn join(&self, room: &str, name: &str) -> anyhow::Result<TestClient> {
        let mut client = self.connect().await?;
        client
            .emit("join-room", json!({ "roomId": room, "userName": name }))
            .await?;
        self.settle().await?;
        client.take_events();
        Ok(client)
    }

    /// Simulate the transport dropping a connection.
    pub async fn disconnect(&self, client: &TestClient) -> anyhow::Result<()> {
        self.emitter.unregister(&client.connection_id);
        self.handle
            .disconnected(client.connection_id.clone())
            .await
            .map_err(|e| anyhow!("engine rejected disconnect: {e}"))
    }

    /// Flush the engine mailbox: a request/response round-trip completes
    /// only after everything queued ahead of it was handled.
    pub async fn settle(&self) -> anyhow::Result<HubStats> {
        self.handle
            .stats()
            .await
            .map_err(|e| anyhow!("stats round-trip failed: {e}"))
    }

    /// Room state, post-settle.
    pub async fn room(&self, room_id: &str) -> anyhow::Result<Option<RoomSnapshot>> {
        self.handle
            .room_snapshot(room_id.to_string())
            .await
            .map_err(|e| anyhow!("room snapshot failed: {e}"))
    }
}

/// All captured events with the given name.
#[must_use]
pub fn events_named<'a>(
    events: &'a [CapturedEvent],
    name: &str,
) -> Vec<&'a CapturedEvent> {
    events.iter().filter(|e| e.name == name).collect()
}

/// The single event with the given name; panics when absent or duplicated.
///
/// # Panics
///
/// Intended for tests, which want loud failures.
#[must_use]
pub fn single_event<'a>(events: &'a [CapturedEvent], name: &str) -> &'a CapturedEvent {
    let matches = events_named(events, name);
    assert_eq!(
        matches.len(),
        1,
        "expected exactly one '{name}' event, found {}",
        matches.len()
    );
    matches[0]
}
