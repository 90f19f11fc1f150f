//! Signaling Hub entry point.
//!
//! Starts the engine task, the lifecycle supervisor, and one HTTP listener
//! carrying the WebSocket transport, the long-poll fallback, health probes
//! and the stats endpoint (default: 0.0.0.0:4000).
//!
//! # Shutdown
//!
//! SIGTERM/SIGINT/SIGHUP/SIGUSR2 trigger the staged sequence: readiness
//! flips off, `server-shutdown` (with a recovery snapshot) is broadcast,
//! connections get the soft deadline to close before being forced, the
//! listener stops, and the process exits 0. An independent hard deadline
//! exits 1 if the drain ever wedges. A failed server task gets a 1-second
//! grace before the same sequence runs.

use signaling_hub::actors::HubActorHandle;
use signaling_hub::config::Config;
use signaling_hub::metrics::HubMetrics;
use signaling_hub::observability::health::HealthState;
use signaling_hub::tasks::start_supervisor;
use signaling_hub::transport::{build_router, longpoll::LongPollRegistry, Emitter, TransportState};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signaling_hub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Signaling Hub");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        hub_id = %config.hub_id,
        port = config.port,
        max_participants = config.max_participants,
        max_room_size = config.max_room_size,
        max_payload_bytes = config.max_payload_bytes,
        stale_after_seconds = config.stale_after_seconds,
        cors_origins = ?config.cors_origins,
        announced_ip = ?config.announced_ip,
        "Configuration loaded successfully"
    );

    let config = Arc::new(config);
    let emitter = Emitter::new();
    let metrics = HubMetrics::new();
    let hub = HubActorHandle::new(
        Arc::clone(&config),
        Arc::clone(&emitter),
        Arc::clone(&metrics),
    );
    let health_state = Arc::new(HealthState::new());

    let state = TransportState {
        hub: hub.clone(),
        emitter,
        longpoll: LongPollRegistry::new(),
        config: Arc::clone(&config),
    };
    let app = build_router(state, Arc::clone(&health_state));

    let cancel_token = CancellationToken::new();
    let supervisor_handle = tokio::spawn(start_supervisor(
        hub.clone(),
        metrics,
        Arc::clone(&config),
        cancel_token.clone(),
    ));

    // A taken port is fatal: bubble the error out of main (exit code 1).
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(port = config.port, "Failed to bind listener: {}", e);
        e
    })?;

    health_state.set_ready();
    info!("Signaling Hub listening on {}", addr);

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(
        hub.clone(),
        Arc::clone(&health_state),
        cancel_token.clone(),
        Duration::from_secs(config.shutdown_hard_deadline_seconds),
    ));

    if let Err(e) = server.await {
        // Runtime server failure: brief grace, then the same drain path.
        error!("Server error: {}", e);
        tokio::time::sleep(Duration::from_secs(1)).await;
        health_state.set_not_ready();
        let _ = hub.shutdown().await;
    }

    cancel_token.cancel();
    if let Err(e) = supervisor_handle.await {
        error!("Supervisor task error: {}", e);
    }
    hub.cancel();

    info!("Signaling Hub shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal, then run the staged drain.
///
/// Returning resumes `axum::serve`'s graceful shutdown, which stops the
/// listener; by then the hub has already broadcast `server-shutdown` and
/// force-closed every connection, so the server future resolves promptly.
/// The hard deadline is armed independently and exits 1 if it does not.
async fn shutdown_signal(
    hub: HubActorHandle,
    health_state: Arc<HealthState>,
    cancel_token: CancellationToken,
    hard_deadline: Duration,
) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;
        tokio::select! {
            () = ctrl_c => {}
            () = unix_signal(SignalKind::terminate(), "SIGTERM") => {}
            () = unix_signal(SignalKind::hangup(), "SIGHUP") => {}
            () = unix_signal(SignalKind::user_defined2(), "SIGUSR2") => {}
        }
    }
    #[cfg(not(unix))]
    ctrl_c.await;

    health_state.set_not_ready();

    tokio::spawn(async move {
        tokio::time::sleep(hard_deadline).await;
        error!("Hard shutdown deadline expired, exiting immediately");
        std::process::exit(1);
    });

    if let Err(e) = hub.shutdown().await {
        error!("Engine shutdown error: {}", e);
    }
    cancel_token.cancel();
}

#[cfg(unix)]
async fn unix_signal(kind: tokio::signal::unix::SignalKind, name: &'static str) {
    match tokio::signal::unix::signal(kind) {
        Ok(mut stream) => {
            stream.recv().await;
            info!("Received {}, starting graceful shutdown...", name);
        }
        Err(e) => {
            error!("Failed to listen for {}: {}", name, e);
            std::future::pending::<()>().await;
        }
    }
}
