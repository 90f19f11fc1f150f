//! Signaling hub configuration.
//!
//! Configuration is loaded from environment variables with sensible
//! defaults; `from_vars` accepts an injected map so tests never touch the
//! process environment.

use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default listen port for the combined WebSocket/long-poll/health surface.
pub const DEFAULT_PORT: u16 = 4000;

/// Default process-wide participant ceiling.
pub const DEFAULT_MAX_PARTICIPANTS: usize = 1000;

/// Default per-room member ceiling.
pub const DEFAULT_MAX_ROOM_SIZE: usize = 50;

/// Default per-message payload ceiling (1 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Payload size above which long-poll responses are compressed.
pub const DEFAULT_COMPRESSION_THRESHOLD_BYTES: usize = 1024;

/// Default stale-connection sweep interval in seconds.
pub const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;

/// Default staleness threshold: last liveness signal older than this is dead.
pub const DEFAULT_STALE_AFTER_SECONDS: u64 = 300;

/// Default health log-line interval in seconds.
pub const DEFAULT_HEALTH_LOG_INTERVAL_SECONDS: u64 = 30;

/// Default resident-memory threshold that triggers an out-of-cycle sweep.
pub const DEFAULT_MEMORY_SWEEP_THRESHOLD_MB: u64 = 500;

/// Default soft shutdown deadline: connections get this long to close.
pub const DEFAULT_SHUTDOWN_SOFT_DEADLINE_SECONDS: u64 = 5;

/// Default hard shutdown deadline: the process exits non-zero after this.
pub const DEFAULT_SHUTDOWN_HARD_DEADLINE_SECONDS: u64 = 15;

/// Downtime hint carried in `server-shutdown` payloads, in milliseconds.
pub const EXPECTED_DOWNTIME_MS: u64 = 30_000;

/// Protocol version announced in `connection-confirmed`.
pub const SERVER_VERSION: &str = "2.0.0";

/// Default hub instance id prefix.
const DEFAULT_HUB_ID_PREFIX: &str = "hub";

/// Signaling hub configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen port (default: 4000).
    pub port: u16,

    /// Allowed CORS origins. `["*"]` (the default) allows any origin;
    /// credentials are always disabled so cookies are never carried.
    pub cors_origins: Vec<String>,

    /// Announced IP for downstream media relays. Opaque to the engine,
    /// surfaced to clients in `connection-confirmed.features`.
    pub announced_ip: Option<String>,

    /// Process-wide participant ceiling.
    pub max_participants: usize,

    /// Per-room member ceiling.
    pub max_room_size: usize,

    /// Per-message payload ceiling in bytes.
    pub max_payload_bytes: usize,

    /// Long-poll compression threshold in bytes.
    pub compression_threshold_bytes: usize,

    /// Stale sweep interval in seconds.
    pub sweep_interval_seconds: u64,

    /// Staleness threshold in seconds.
    pub stale_after_seconds: u64,

    /// Health log-line interval in seconds.
    pub health_log_interval_seconds: u64,

    /// Resident-memory threshold (MB) for the out-of-cycle sweep.
    pub memory_sweep_threshold_mb: u64,

    /// Soft shutdown deadline in seconds.
    pub shutdown_soft_deadline_seconds: u64,

    /// Hard shutdown deadline in seconds.
    pub shutdown_hard_deadline_seconds: u64,

    /// Unique identifier for this hub instance.
    pub hub_id: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = match vars.get("HUB_PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue("HUB_PORT", raw.clone()))?,
            None => DEFAULT_PORT,
        };

        let cors_origins = vars
            .get("HUB_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| vec!["*".to_string()]);

        let announced_ip = vars.get("HUB_ANNOUNCED_IP").cloned();

        let max_participants = parse_or(vars, "HUB_MAX_PARTICIPANTS", DEFAULT_MAX_PARTICIPANTS);
        let max_room_size = parse_or(vars, "HUB_MAX_ROOM_SIZE", DEFAULT_MAX_ROOM_SIZE);
        let max_payload_bytes = parse_or(vars, "HUB_MAX_PAYLOAD_BYTES", DEFAULT_MAX_PAYLOAD_BYTES);
        let compression_threshold_bytes = parse_or(
            vars,
            "HUB_COMPRESSION_THRESHOLD_BYTES",
            DEFAULT_COMPRESSION_THRESHOLD_BYTES,
        );
        let sweep_interval_seconds =
            parse_or(vars, "HUB_SWEEP_INTERVAL_SECONDS", DEFAULT_SWEEP_INTERVAL_SECONDS);
        let stale_after_seconds =
            parse_or(vars, "HUB_STALE_AFTER_SECONDS", DEFAULT_STALE_AFTER_SECONDS);
        let health_log_interval_seconds = parse_or(
            vars,
            "HUB_HEALTH_LOG_INTERVAL_SECONDS",
            DEFAULT_HEALTH_LOG_INTERVAL_SECONDS,
        );
        let memory_sweep_threshold_mb = parse_or(
            vars,
            "HUB_MEMORY_SWEEP_THRESHOLD_MB",
            DEFAULT_MEMORY_SWEEP_THRESHOLD_MB,
        );
        let shutdown_soft_deadline_seconds = parse_or(
            vars,
            "HUB_SHUTDOWN_SOFT_DEADLINE_SECONDS",
            DEFAULT_SHUTDOWN_SOFT_DEADLINE_SECONDS,
        );
        let shutdown_hard_deadline_seconds = parse_or(
            vars,
            "HUB_SHUTDOWN_HARD_DEADLINE_SECONDS",
            DEFAULT_SHUTDOWN_HARD_DEADLINE_SECONDS,
        );

        let hub_id = vars.get("HUB_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_HUB_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            port,
            cors_origins,
            announced_ip,
            max_participants,
            max_room_size,
            max_payload_bytes,
            compression_threshold_bytes,
            sweep_interval_seconds,
            stale_after_seconds,
            health_log_interval_seconds,
            memory_sweep_threshold_mb,
            shutdown_soft_deadline_seconds,
            shutdown_hard_deadline_seconds,
            hub_id,
        })
    }
}

impl Default for Config {
    #[allow(clippy::expect_used)] // no required variables, cannot fail on an empty map
    fn default() -> Self {
        Self::from_vars(&HashMap::new()).expect("default configuration is valid")
    }
}

fn parse_or<T: std::str::FromStr>(vars: &HashMap<String, String>, key: &str, default: T) -> T {
    vars.get(key).and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("config should load");

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.cors_origins, vec!["*".to_string()]);
        assert_eq!(config.announced_ip, None);
        assert_eq!(config.max_participants, 1000);
        assert_eq!(config.max_room_size, 50);
        assert_eq!(config.max_payload_bytes, 1024 * 1024);
        assert_eq!(config.sweep_interval_seconds, 60);
        assert_eq!(config.stale_after_seconds, 300);
        assert_eq!(config.memory_sweep_threshold_mb, 500);
        assert_eq!(config.shutdown_soft_deadline_seconds, 5);
        assert_eq!(config.shutdown_hard_deadline_seconds, 15);
        assert!(config.hub_id.starts_with("hub-"));
    }

    #[test]
    fn test_from_vars_custom_values() {
        let vars = HashMap::from([
            ("HUB_PORT".to_string(), "9100".to_string()),
            (
                "HUB_CORS_ORIGINS".to_string(),
                "https://a.example, https://b.example".to_string(),
            ),
            ("HUB_ANNOUNCED_IP".to_string(), "203.0.113.9".to_string()),
            ("HUB_MAX_ROOM_SIZE".to_string(), "8".to_string()),
            ("HUB_STALE_AFTER_SECONDS".to_string(), "120".to_string()),
            ("HUB_ID".to_string(), "hub-custom-001".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("config should load");

        assert_eq!(config.port, 9100);
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(config.announced_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(config.max_room_size, 8);
        assert_eq!(config.stale_after_seconds, 120);
        assert_eq!(config.hub_id, "hub-custom-001");
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        let vars = HashMap::from([("HUB_PORT".to_string(), "not-a-port".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue("HUB_PORT", _))));
    }

    #[test]
    fn test_unparsable_optional_values_fall_back_to_defaults() {
        let vars = HashMap::from([("HUB_MAX_ROOM_SIZE".to_string(), "fifty".to_string())]);
        let config = Config::from_vars(&vars).expect("config should load");
        assert_eq!(config.max_room_size, DEFAULT_MAX_ROOM_SIZE);
    }
}
