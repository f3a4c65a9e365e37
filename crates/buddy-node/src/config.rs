//! Node configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (BUDDY_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use buddy_core::{PresenceConfig, ViolationPolicy};
use buddy_protocol::Status;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Local presence settings.
    #[serde(default)]
    pub presence: PresenceSection,

    /// Presence session every buddy joins.
    #[serde(default)]
    pub session: SessionSection,

    /// Simulated buddies sharing the channel.
    #[serde(default = "default_peers")]
    pub peers: Vec<PeerConfig>,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Local presence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceSection {
    /// Name announced to other buddies.
    #[serde(default = "default_display_name")]
    pub display_name: String,

    /// Abort on protocol violations instead of reporting them.
    #[serde(default = "default_strict")]
    pub strict: bool,

    /// Capacity of the presence event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

/// Presence session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    /// API key handed out with every session.
    #[serde(default = "default_api_key")]
    pub api_key: String,

    /// Presence session identifier.
    #[serde(default = "default_session_id")]
    pub session_id: String,
}

/// A simulated buddy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Display name.
    pub name: String,

    /// Accept invitations as soon as they arrive.
    #[serde(default = "default_true")]
    pub auto_accept: bool,

    /// Status announced after joining.
    #[serde(default)]
    pub status: Status,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default)]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_display_name() -> String {
    std::env::var("BUDDY_NAME").unwrap_or_else(|_| "Me".to_string())
}

fn default_strict() -> bool {
    std::env::var("BUDDY_STRICT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false)
}

fn default_event_capacity() -> usize {
    256
}

fn default_api_key() -> String {
    "local".to_string()
}

fn default_session_id() -> String {
    "presence".to_string()
}

fn default_peers() -> Vec<PeerConfig> {
    vec![
        PeerConfig {
            name: "Alice".to_string(),
            auto_accept: true,
            status: Status::Online,
        },
        PeerConfig {
            name: "Bob".to_string(),
            auto_accept: false,
            status: Status::Online,
        },
    ]
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            presence: PresenceSection::default(),
            session: SessionSection::default(),
            peers: default_peers(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for PresenceSection {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            strict: default_strict(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
            session_id: default_session_id(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from `BUDDY_CONFIG`, the default paths, or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("BUDDY_CONFIG") {
            let expanded = shellexpand::tilde(&path);
            return Self::from_file(expanded.as_ref());
        }

        let config_paths = [
            "buddy.toml",
            "/etc/buddy/buddy.toml",
            "~/.config/buddy/buddy.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Presence settings for the local buddy.
    #[must_use]
    pub fn presence_config(&self) -> PresenceConfig {
        self.presence_config_for(&self.presence.display_name)
    }

    /// Presence settings for a buddy with the given display name.
    #[must_use]
    pub fn presence_config_for(&self, display_name: &str) -> PresenceConfig {
        PresenceConfig {
            display_name: display_name.to_string(),
            violation_policy: if self.presence.strict {
                ViolationPolicy::Abort
            } else {
                ViolationPolicy::Report
            },
            event_capacity: self.presence.event_capacity,
        }
    }
}
