//! Signal relay configuration.
//!
//! Configuration is loaded from environment variables. Nothing is required;
//! every setting has a default suitable for local development.

use common::config::ObservabilityConfig;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default signaling (WebSocket) bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default per-connection outbound queue depth.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Default maximum accepted client frame size in bytes.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024;

/// Default relay instance ID prefix.
pub const DEFAULT_RELAY_ID_PREFIX: &str = "relay";

/// Who receives `voice-users-update` after a mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SnapshotScope {
    /// Every connection receives the full, unfiltered snapshot.
    #[default]
    Global,
    /// Each affected room's members (plus the acting connection) receive
    /// only that room's participants.
    Room,
}

impl SnapshotScope {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SnapshotScope::Global => "global",
            SnapshotScope::Room => "room",
        }
    }
}

impl fmt::Display for SnapshotScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotScope {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(SnapshotScope::Global),
            "room" => Ok(SnapshotScope::Room),
            other => Err(ConfigError::InvalidValue(format!(
                "RELAY_SNAPSHOT_SCOPE must be 'global' or 'room', got '{other}'"
            ))),
        }
    }
}

/// Signal relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Signaling server bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Unique identifier for this relay instance.
    pub relay_id: String,

    /// Snapshot fan-out scope (default: global).
    pub snapshot_scope: SnapshotScope,

    /// Outbound frames queued per connection before frames are dropped.
    pub outbound_buffer: usize,

    /// Largest client text frame accepted, in bytes.
    pub max_frame_bytes: usize,

    /// Logging settings (`RELAY_LOG_LEVEL`, `RELAY_LOG_JSON`).
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for out-of-range or unknown values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for out-of-range or unknown values.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("RELAY_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("RELAY_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let snapshot_scope = match vars.get("RELAY_SNAPSHOT_SCOPE") {
            Some(raw) => raw.parse()?,
            None => SnapshotScope::default(),
        };

        let outbound_buffer = vars
            .get("RELAY_OUTBOUND_BUFFER")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_OUTBOUND_BUFFER);
        if outbound_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "RELAY_OUTBOUND_BUFFER must be greater than zero".to_string(),
            ));
        }

        let max_frame_bytes = vars
            .get("RELAY_MAX_FRAME_BYTES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_FRAME_BYTES);
        if max_frame_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "RELAY_MAX_FRAME_BYTES must be greater than zero".to_string(),
            ));
        }

        // Generate relay instance ID
        let relay_id = vars.get("RELAY_ID").cloned().unwrap_or_else(|| {
            let hostname = vars
                .get("HOSTNAME")
                .cloned()
                .unwrap_or_else(|| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_RELAY_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            health_bind_address,
            relay_id,
            snapshot_scope,
            outbound_buffer,
            max_frame_bytes,
            observability: ObservabilityConfig::from_vars("RELAY", vars),
        })
    }
}
