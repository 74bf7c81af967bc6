//! Voice client configuration.
//!
//! Loaded from `VOICE_*` environment variables. The relay URL and display
//! name are required; everything else has a default.

use signaling_protocol::events::MAX_DISPLAY_NAME_CHARS;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Noise suppression is on unless configured otherwise.
pub const DEFAULT_NOISE_SUPPRESSION: bool = true;

/// Seconds to wait for a placed call to deliver a remote stream.
pub const DEFAULT_CALL_SETUP_TIMEOUT_SECONDS: u64 = 15;

/// Which side of a participant pair places the call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkPolicy {
    /// The participant listed later in the room snapshot dials every earlier
    /// member once; `peer-joined` recipients wait for the call.
    #[default]
    NewcomerDials,
    /// Every `peer-joined` recipient dials the newcomer.
    NoticeRecipientDials,
}

impl LinkPolicy {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            LinkPolicy::NewcomerDials => "newcomer",
            LinkPolicy::NoticeRecipientDials => "notice-recipient",
        }
    }
}

impl fmt::Display for LinkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LinkPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newcomer" => Ok(LinkPolicy::NewcomerDials),
            "notice-recipient" => Ok(LinkPolicy::NoticeRecipientDials),
            other => Err(ConfigError::InvalidValue(format!(
                "VOICE_LINK_POLICY must be 'newcomer' or 'notice-recipient', got '{other}'"
            ))),
        }
    }
}

/// Settings the peer mesh actor runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshSettings {
    /// Name announced in `join-voice`.
    pub display_name: String,

    /// Initial noise suppression preference.
    pub noise_suppression: bool,

    pub link_policy: LinkPolicy,

    /// `None` disables the call-setup watchdog.
    pub call_setup_timeout: Option<Duration>,
}

impl MeshSettings {
    /// Defaults for everything but the display name.
    #[must_use]
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            noise_suppression: DEFAULT_NOISE_SUPPRESSION,
            link_policy: LinkPolicy::default(),
            call_setup_timeout: Some(Duration::from_secs(DEFAULT_CALL_SETUP_TIMEOUT_SECONDS)),
        }
    }
}

/// Voice client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay WebSocket URL, e.g. `ws://localhost:3000/ws`.
    pub relay_url: String,

    pub display_name: String,

    pub noise_suppression: bool,

    pub link_policy: LinkPolicy,

    /// `None` when `VOICE_CALL_SETUP_TIMEOUT_SECONDS=0`.
    pub call_setup_timeout: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or invalid.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let relay_url = vars
            .get("VOICE_RELAY_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("VOICE_RELAY_URL".to_string()))?
            .trim()
            .to_string();
        if !(relay_url.starts_with("ws://") || relay_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue(format!(
                "VOICE_RELAY_URL must be a ws:// or wss:// URL, got '{relay_url}'"
            )));
        }

        let display_name = vars
            .get("VOICE_DISPLAY_NAME")
            .ok_or_else(|| ConfigError::MissingEnvVar("VOICE_DISPLAY_NAME".to_string()))?
            .trim()
            .to_string();
        let name_chars = display_name.chars().count();
        if name_chars == 0 || name_chars > MAX_DISPLAY_NAME_CHARS {
            return Err(ConfigError::InvalidValue(format!(
                "VOICE_DISPLAY_NAME must be 1-{MAX_DISPLAY_NAME_CHARS} characters"
            )));
        }

        let noise_suppression = vars
            .get("VOICE_NOISE_SUPPRESSION")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_NOISE_SUPPRESSION);

        let link_policy = match vars.get("VOICE_LINK_POLICY") {
            Some(raw) => raw.parse()?,
            None => LinkPolicy::default(),
        };

        let timeout_seconds = vars
            .get("VOICE_CALL_SETUP_TIMEOUT_SECONDS")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_CALL_SETUP_TIMEOUT_SECONDS);
        let call_setup_timeout =
            (timeout_seconds > 0).then(|| Duration::from_secs(timeout_seconds));

        Ok(ClientConfig {
            relay_url,
            display_name,
            noise_suppression,
            link_policy,
            call_setup_timeout,
        })
    }

    /// Settings for [`crate::mesh::PeerMeshActor::spawn`].
    #[must_use]
    pub fn mesh_settings(&self) -> MeshSettings {
        MeshSettings {
            display_name: self.display_name.clone(),
            noise_suppression: self.noise_suppression,
            link_policy: self.link_policy,
            call_setup_timeout: self.call_setup_timeout,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        HashMap::from([
            (
                "VOICE_RELAY_URL".to_string(),
                "ws://localhost:3000/ws".to_string(),
            ),
            ("VOICE_DISPLAY_NAME".to_string(), "  Ada  ".to_string()),
        ])
    }

    #[test]
    fn test_from_vars_defaults() {
        let config = ClientConfig::from_vars(&base_vars()).expect("config should load");

        assert_eq!(config.relay_url, "ws://localhost:3000/ws");
        assert_eq!(config.display_name, "Ada");
        assert!(config.noise_suppression);
        assert_eq!(config.link_policy, LinkPolicy::NewcomerDials);
        assert_eq!(
            config.call_setup_timeout,
            Some(Duration::from_secs(DEFAULT_CALL_SETUP_TIMEOUT_SECONDS))
        );
    }

    #[test]
    fn test_from_vars_custom_values() {
        let mut vars = base_vars();
        vars.insert("VOICE_NOISE_SUPPRESSION".to_string(), "false".to_string());
        vars.insert(
            "VOICE_LINK_POLICY".to_string(),
            "notice-recipient".to_string(),
        );
        vars.insert(
            "VOICE_CALL_SETUP_TIMEOUT_SECONDS".to_string(),
            "3".to_string(),
        );

        let config = ClientConfig::from_vars(&vars).unwrap();
        assert!(!config.noise_suppression);
        assert_eq!(config.link_policy, LinkPolicy::NoticeRecipientDials);
        assert_eq!(config.call_setup_timeout, Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_zero_timeout_disables_watchdog() {
        let mut vars = base_vars();
        vars.insert(
            "VOICE_CALL_SETUP_TIMEOUT_SECONDS".to_string(),
            "0".to_string(),
        );

        let config = ClientConfig::from_vars(&vars).unwrap();
        assert_eq!(config.call_setup_timeout, None);
        assert_eq!(config.mesh_settings().call_setup_timeout, None);
    }

    #[test]
    fn test_missing_relay_url() {
        let mut vars = base_vars();
        vars.remove("VOICE_RELAY_URL");

        let result = ClientConfig::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(ref var)) if var == "VOICE_RELAY_URL")
        );
    }

    #[test]
    fn test_missing_display_name() {
        let mut vars = base_vars();
        vars.remove("VOICE_DISPLAY_NAME");

        let result = ClientConfig::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::MissingEnvVar(ref var)) if var == "VOICE_DISPLAY_NAME")
        );
    }

    #[test]
    fn test_rejects_http_relay_url() {
        let mut vars = base_vars();
        vars.insert(
            "VOICE_RELAY_URL".to_string(),
            "http://localhost:3000/ws".to_string(),
        );

        assert!(matches!(
            ClientConfig::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_rejects_blank_display_name() {
        let mut vars = base_vars();
        vars.insert("VOICE_DISPLAY_NAME".to_string(), "   ".to_string());

        assert!(matches!(
            ClientConfig::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_unknown_link_policy() {
        let mut vars = base_vars();
        vars.insert("VOICE_LINK_POLICY".to_string(), "everyone".to_string());

        let err = ClientConfig::from_vars(&vars).unwrap_err();
        assert!(err.to_string().contains("everyone"));
    }

    #[test]
    fn test_link_policy_round_trips_through_display() {
        for policy in [LinkPolicy::NewcomerDials, LinkPolicy::NoticeRecipientDials] {
            assert_eq!(policy.to_string().parse::<LinkPolicy>().unwrap(), policy);
        }
    }
}
