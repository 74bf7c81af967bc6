//! Common configuration types for Huddle components.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default tracing filter directive when `RUST_LOG` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    /// Read `<prefix>_LOG_LEVEL` and `<prefix>_LOG_JSON` from a variable map.
    ///
    /// Unparseable booleans fall back to plain-text logs.
    #[must_use]
    pub fn from_vars(prefix: &str, vars: &HashMap<String, String>) -> Self {
        let log_level = vars
            .get(&format!("{prefix}_LOG_LEVEL"))
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let json_logs = vars
            .get(&format!("{prefix}_LOG_JSON"))
            .and_then(|s| s.parse().ok())
            .unwrap_or(false);

        Self {
            log_level,
            json_logs,
        }
    }
}
