//! Per-connection adaptive health monitor.
//!
//! One monitor task per connection. The loop sends `ping{timestamp,
//! serverLoad, memoryUsage}` on an adaptive interval, waits up to 15
//! seconds for the matching `pong` (routed in by the engine), and adjusts:
//!
//! - pong timeout: unhealthy, reconnect count +1, interval -5 s (floor 15 s)
//! - latency < 100 ms: interval +5 s (ceiling 60 s)
//! - latency > 1000 ms: interval -2 s (floor 15 s)
//!
//! After every observation the monitor reports its snapshot to the engine,
//! which owns the health map the stale sweep and `pong`/`reconnect-response`
//! payloads read from. The task is cancelled with its connection.

use crate::actors::messages::HubMessage;
use crate::events::{now_ms, ServerEvent};
use crate::system_info::gather_system_info;
use crate::transport::Emitter;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Starting ping interval.
pub const INITIAL_PING_INTERVAL: Duration = Duration::from_secs(30);

/// Lower clamp for the adaptive interval.
pub const MIN_PING_INTERVAL: Duration = Duration::from_secs(15);

/// Upper clamp for the adaptive interval.
pub const MAX_PING_INTERVAL: Duration = Duration::from_secs(60);

/// How long to wait for a pong before marking the connection unhealthy.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(15);

/// Latency below this widens the interval.
const FAST_LATENCY: Duration = Duration::from_millis(100);

/// Latency above this narrows the interval.
const SLOW_LATENCY: Duration = Duration::from_millis(1000);

/// Connection-health record, serialized into `pong` and
/// `reconnect-response` payloads.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    /// Connection establishment time, epoch milliseconds.
    pub connected_at: i64,
    /// Last successful liveness observation, epoch milliseconds.
    pub last_ping: i64,
    /// Pings sent.
    pub ping_count: u32,
    /// Missed-pong count.
    pub reconnect_count: u32,
    /// Whether the last ping was answered in time.
    pub healthy: bool,
    /// Latest measured round-trip, when one exists.
    pub latency_ms: Option<u64>,
    /// Monotonic twin of `last_ping`, used by the stale sweep. Tracks the
    /// paused test clock, unlike the wall-clock wire fields.
    #[serde(skip)]
    pub last_activity: Instant,
}

impl HealthSnapshot {
    #[must_use]
    pub fn new() -> Self {
        let now = now_ms();
        Self {
            connected_at: now,
            last_ping: now,
            ping_count: 0,
            reconnect_count: 0,
            healthy: true,
            latency_ms: None,
            last_activity: Instant::now(),
        }
    }

    /// Record a successful liveness observation (pong or client ping).
    pub fn touch(&mut self) {
        self.last_ping = now_ms();
        self.last_activity = Instant::now();
    }
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// The adaptive interval state machine.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveInterval {
    current: Duration,
}

impl AdaptiveInterval {
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: INITIAL_PING_INTERVAL,
        }
    }

    #[must_use]
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Pong timeout: back off toward the floor.
    pub fn on_timeout(&mut self) {
        self.current = self
            .current
            .saturating_sub(Duration::from_secs(5))
            .max(MIN_PING_INTERVAL);
    }

    /// Measured round-trip: widen on fast links, narrow on slow ones.
    pub fn on_latency(&mut self, latency: Duration) {
        if latency < FAST_LATENCY {
            self.current = (self.current + Duration::from_secs(5)).min(MAX_PING_INTERVAL);
        } else if latency > SLOW_LATENCY {
            self.current = self
                .current
                .saturating_sub(Duration::from_secs(2))
                .max(MIN_PING_INTERVAL);
        }
    }
}

impl Default for AdaptiveInterval {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle the engine keeps per monitored connection.
#[derive(Debug)]
pub struct MonitorHandle {
    pong_tx: mpsc::UnboundedSender<Option<i64>>,
    cancel_token: CancellationToken,
}

impl MonitorHandle {
    /// Route a client `pong` (with its optional echoed timestamp) to the
    /// waiting monitor.
    pub fn notify_pong(&self, echoed_timestamp: Option<i64>) {
        let _ = self.pong_tx.send(echoed_timestamp);
    }

    /// Cancel the monitor task.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

/// The per-connection monitor task.
pub struct HealthMonitor {
    connection_id: String,
    emitter: Arc<Emitter>,
    hub_tx: mpsc::Sender<HubMessage>,
    pong_rx: mpsc::UnboundedReceiver<Option<i64>>,
    cancel_token: CancellationToken,
    interval: AdaptiveInterval,
    snapshot: HealthSnapshot,
}

impl HealthMonitor {
    /// Spawn a monitor for one connection.
    ///
    /// The token should be a child of the engine's root token so shutdown
    /// cancels every monitor without bookkeeping.
    pub fn spawn(
        connection_id: String,
        emitter: Arc<Emitter>,
        hub_tx: mpsc::Sender<HubMessage>,
        cancel_token: CancellationToken,
    ) -> (MonitorHandle, JoinHandle<()>) {
        let (pong_tx, pong_rx) = mpsc::unbounded_channel();

        let monitor = Self {
            connection_id,
            emitter,
            hub_tx,
            pong_rx,
            cancel_token: cancel_token.clone(),
            interval: AdaptiveInterval::new(),
            snapshot: HealthSnapshot::new(),
        };

        let task_handle = tokio::spawn(monitor.run());

        (
            MonitorHandle {
                pong_tx,
                cancel_token,
            },
            task_handle,
        )
    }

    async fn run(mut self) {
        debug!(
            target: "hub.monitor",
            connection_id = %self.connection_id,
            "Health monitor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                () = tokio::time::sleep(self.interval.current()) => {}
            }

            // Stray pongs from a previous round would skew the next
            // latency sample; drop them before pinging.
            while self.pong_rx.try_recv().is_ok() {}

            if !self.send_ping() {
                debug!(
                    target: "hub.monitor",
                    connection_id = %self.connection_id,
                    "Connection gone, monitor exiting"
                );
                break;
            }

            let sent_at = Instant::now();
            self.snapshot.ping_count += 1;

            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                outcome = tokio::time::timeout(PONG_TIMEOUT, self.pong_rx.recv()) => {
                    match outcome {
                        Ok(Some(_echoed)) => {
                            let latency = sent_at.elapsed();
                            self.snapshot.healthy = true;
                            self.snapshot.latency_ms = Some(latency.as_millis() as u64);
                            self.snapshot.touch();
                            self.interval.on_latency(latency);
                        }
                        Ok(None) => break,
                        Err(_) => {
                            self.snapshot.healthy = false;
                            self.snapshot.reconnect_count += 1;
                            self.interval.on_timeout();
                            warn!(
                                target: "hub.monitor",
                                connection_id = %self.connection_id,
                                reconnect_count = self.snapshot.reconnect_count,
                                next_interval_secs = self.interval.current().as_secs(),
                                "Pong timeout, connection marked unhealthy"
                            );
                        }
                    }
                }
            }

            let report = HubMessage::HealthReport {
                connection_id: self.connection_id.clone(),
                snapshot: self.snapshot.clone(),
            };
            if self.hub_tx.send(report).await.is_err() {
                break;
            }
        }

        debug!(
            target: "hub.monitor",
            connection_id = %self.connection_id,
            pings = self.snapshot.ping_count,
            "Health monitor stopped"
        );
    }

    fn send_ping(&self) -> bool {
        let info = gather_system_info();
        let ping = ServerEvent::new(
            "ping",
            json!({
                "timestamp": now_ms(),
                "serverLoad": info.cpu_percent,
                "memoryUsage": info.memory_percent,
            }),
        );
        self.emitter.emit(&self.connection_id, &ping)
    }
}
