//! Configuration Management
//!
//! Optional YAML configuration for cipower, overlaid by environment
//! variables and finally by command-line flags.

use crate::oci::auth::{default_config_file, DEFAULT_PROFILE};
use crate::poller::PollConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;
const DEFAULT_MAX_WAIT_SECS: u64 = 240;
const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// OCI region, e.g. `eu-frankfurt-1`
    pub region: Option<String>,
    /// OCI CLI config file used when no resource principal is present
    pub oci_config_file: Option<PathBuf>,
    /// Profile section in the OCI CLI config file
    pub oci_profile: Option<String>,
    /// Seconds between status queries while waiting
    pub poll_interval_secs: u64,
    /// Seconds to wait for the target state
    pub max_wait_secs: u64,
    /// Vault secret holding the container instance OCID
    pub secret_id: Option<String>,
    /// Notification topic for failure messages
    pub notification_topic: Option<String>,
    /// Listen address for `serve`
    pub listen: Option<String>,
    /// Single base URL for every OCI service
    pub endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: None,
            oci_config_file: None,
            oci_profile: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_wait_secs: DEFAULT_MAX_WAIT_SECS,
            secret_id: None,
            notification_topic: None,
            listen: None,
            endpoint: None,
        }
    }
}

impl Config {
    /// Get the default config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cipower").join("config.yaml"))
    }

    /// Load configuration from `path` (or the default location), then
    /// apply environment overrides. Unreadable files fall back to defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).or_else(Self::config_path);

        let config = match path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(content) => Self::from_yaml(&content).unwrap_or_else(|e| {
                    tracing::warn!("Ignoring invalid config {:?}: {}", path, e);
                    Self::default()
                }),
                Err(e) => {
                    tracing::warn!("Failed to read config {:?}: {}", path, e);
                    Self::default()
                }
            },
            _ => Self::default(),
        };

        config.with_env_from(|key| std::env::var(key).ok())
    }

    /// Parse a YAML document
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config.validated())
    }

    /// A zero interval would hammer the status API; fall back to the default
    fn validated(mut self) -> Self {
        if self.poll_interval_secs == 0 {
            tracing::warn!(
                "poll_interval_secs must be at least 1, using {}s",
                DEFAULT_POLL_INTERVAL_SECS
            );
            self.poll_interval_secs = DEFAULT_POLL_INTERVAL_SECS;
        }
        self
    }

    /// Environment overrides (env > file)
    fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(region) = non_empty("CIPOWER_REGION") {
            self.region = Some(region);
        }
        if let Some(secret_id) = non_empty("CIPOWER_SECRET_ID") {
            self.secret_id = Some(secret_id);
        }
        if let Some(topic) = non_empty("CIPOWER_TOPIC") {
            self.notification_topic = Some(topic);
        }
        if let Some(endpoint) = non_empty("CIPOWER_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        self
    }

    /// Effective OCI config file (config > OCI_CLI_CONFIG_FILE > ~/.oci/config)
    pub fn effective_oci_config_file(&self) -> PathBuf {
        self.oci_config_file.clone().unwrap_or_else(default_config_file)
    }

    /// Effective profile (config > DEFAULT)
    pub fn effective_profile(&self) -> String {
        self.oci_profile
            .clone()
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
    }

    /// Effective listen address for the HTTP adapter
    pub fn effective_listen(&self) -> String {
        self.listen
            .clone()
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string())
    }

    /// Polling parameters for the state poller
    pub fn poll_config(&self) -> PollConfig {
        let interval = match self.poll_interval_secs {
            0 => DEFAULT_POLL_INTERVAL_SECS,
            secs => secs,
        };
        PollConfig::new(
            Duration::from_secs(interval),
            Duration::from_secs(self.max_wait_secs),
        )
    }
}
