//! Transport adapter: WebSocket primary, long-poll fallback.
//!
//! Both transports funnel into the same per-connection send-queues
//! ([`Emitter`]) and the same engine mailbox, so the router never knows
//! which transport a connection rides on. The payload ceiling applies to
//! both (WebSocket message limit, HTTP body limit); CORS is configured
//! from the origin list with credentials disabled, so cookies are never
//! carried; long-poll responses compress above the configured threshold.

pub mod emitter;
pub mod longpoll;
pub mod ws;

pub use emitter::{Emitter, OutboundFrame};

use crate::actors::HubActorHandle;
use crate::config::Config;
use crate::observability::health::{health_router, HealthState};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::compression::predicate::SizeAbove;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::warn;

/// Shared state for the transport handlers.
#[derive(Clone)]
pub struct TransportState {
    pub hub: HubActorHandle,
    pub emitter: Arc<Emitter>,
    pub longpoll: Arc<longpoll::LongPollRegistry>,
    pub config: Arc<Config>,
}

/// Assemble the full HTTP surface: signaling transports, health probes,
/// and the operator stats endpoint.
pub fn build_router(state: TransportState, health: Arc<HealthState>) -> Router {
    let cors = cors_layer(&state.config);
    let body_limit = DefaultBodyLimit::max(state.config.max_payload_bytes);
    let compress_above =
        u16::try_from(state.config.compression_threshold_bytes).unwrap_or(u16::MAX);

    let longpoll_routes = Router::new()
        .route("/longpoll/connect", post(longpoll::connect_handler))
        .route(
            "/longpoll/{connection_id}/events",
            get(longpoll::poll_handler).post(longpoll::submit_handler),
        )
        .layer(CompressionLayer::new().compress_when(SizeAbove::new(compress_above)));

    Router::new()
        .route("/ws", get(ws::websocket_handler))
        .merge(longpoll_routes)
        .route("/stats", get(stats_handler))
        .with_state(state)
        .merge(health_router(health))
        .layer(cors)
        .layer(body_limit)
}

/// CORS from the configured origin list. Credentials stay disabled in
/// every configuration, which also keeps cookies off the wire.
fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false);

    if config.cors_origins.iter().any(|origin| origin == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(
                        target: "hub.transport",
                        origin = %origin,
                        "Ignoring unparsable CORS origin"
                    );
                    None
                }
            })
            .collect();
        layer.allow_origin(origins)
    }
}

/// Operator stats snapshot; read-only, never on the signaling hot path.
async fn stats_handler(State(state): State<TransportState>) -> impl IntoResponse {
    match state.hub.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::metrics::HubMetrics;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn test_state() -> TransportState {
        let config = Arc::new(Config::default());
        let emitter = Emitter::new();
        let metrics = HubMetrics::new();
        let hub = HubActorHandle::new(Arc::clone(&config), Arc::clone(&emitter), metrics);
        TransportState {
            hub,
            emitter,
            longpoll: longpoll::LongPollRegistry::new(),
            config,
        }
    }

    #[tokio::test]
    async fn test_stats_endpoint_returns_snapshot() {
        let app = build_router(test_state(), Arc::new(HealthState::new()));

        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["participants"], 0);
        assert_eq!(value["rooms"], 0);
        assert!(value["hubId"].as_str().unwrap().starts_with("hub-"));
    }

    #[tokio::test]
    async fn test_health_probes_are_mounted() {
        let health = Arc::new(HealthState::new());
        health.set_ready();
        let app = build_router(test_state(), health);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
