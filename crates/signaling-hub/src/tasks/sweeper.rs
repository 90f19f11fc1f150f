//! Lifecycle supervisor: stale sweep and periodic health line.
//!
//! Two timers run orthogonally to event handling:
//!
//! - every sweep interval (default 60 s) the engine is asked to remove
//!   connections whose last liveness signal is older than the threshold
//! - every health interval (default 30 s) a single log line records
//!   participants, rooms and memory; crossing the resident-memory
//!   threshold triggers an out-of-cycle memory-pressure sweep
//!
//! The task exits cleanly when the cancellation token fires.

use crate::actors::{HubActorHandle, SweepReason};
use crate::config::Config;
use crate::metrics::HubMetrics;
use crate::system_info::gather_system_info;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Run the supervisor until cancelled.
#[instrument(skip_all, name = "hub.task.sweeper")]
pub async fn start_supervisor(
    hub: HubActorHandle,
    metrics: Arc<HubMetrics>,
    config: Arc<Config>,
    cancel_token: CancellationToken,
) {
    info!(
        target: "hub.task.sweeper",
        sweep_interval = config.sweep_interval_seconds,
        stale_after = config.stale_after_seconds,
        memory_threshold_mb = config.memory_sweep_threshold_mb,
        "Starting lifecycle supervisor"
    );

    let mut sweep_interval =
        tokio::time::interval(Duration::from_secs(config.sweep_interval_seconds.max(1)));
    let mut health_interval =
        tokio::time::interval(Duration::from_secs(config.health_log_interval_seconds.max(1)));
    // The immediate first tick would sweep an empty hub; skip both.
    sweep_interval.tick().await;
    health_interval.tick().await;

    loop {
        tokio::select! {
            _ = sweep_interval.tick() => {
                if hub.sweep(SweepReason::Interval).await.is_err() {
                    break;
                }
            }

            _ = health_interval.tick() => {
                let system = gather_system_info();
                let snapshot = metrics.snapshot();
                info!(
                    target: "hub.task.sweeper",
                    participants = snapshot.participants,
                    rooms = snapshot.rooms,
                    connections = snapshot.connections,
                    memory_percent = system.memory_percent,
                    resident_mb = system.resident_mb,
                    cpu_percent = system.cpu_percent,
                    "Hub health"
                );

                if system.resident_mb > config.memory_sweep_threshold_mb {
                    warn!(
                        target: "hub.task.sweeper",
                        resident_mb = system.resident_mb,
                        threshold_mb = config.memory_sweep_threshold_mb,
                        "Memory threshold crossed, sweeping out of cycle"
                    );
                    if hub.sweep(SweepReason::MemoryPressure).await.is_err() {
                        break;
                    }
                }
            }

            () = cancel_token.cancelled() => {
                info!(
                    target: "hub.task.sweeper",
                    "Supervisor received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "hub.task.sweeper", "Supervisor stopped");
}
