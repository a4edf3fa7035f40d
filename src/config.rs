//! Publisher configuration.
//!
//! Values are read from a JSON document. Every field has a default so an empty
//! object (`{}`) is a valid configuration.

use std::{path::Path, time::Duration};

use anyhow::Context;
use log::info;
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, retry::ProvisionErrorPattern};

/// Environment variable holding the path of the JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "PRESENCE_PUBLISH_CONFIG";

/// Default window used to merge bursts of triggers (2 seconds).
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(2000);

/// Upper bound for a throttle-driven retry (2 minutes).
pub const DEFAULT_MAX_THROTTLE_DELAY: Duration = Duration::from_millis(120_000);

/// Delay before retrying after a temporary stack error (2 minutes).
pub const DEFAULT_TEMPORARY_ERROR_RETRY: Duration = Duration::from_millis(120_000);

/// Age after which an unanswered request is treated as lost (3 minutes).
pub const DEFAULT_IN_FLIGHT_TIMEOUT: Duration = Duration::from_millis(180_000);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Window during which new triggers are merged into the pending request.
    pub debounce_window_ms: u64,
    /// Longest delay the throttle may impose before a deferred publish.
    pub max_throttle_delay_ms: u64,
    /// Retry delay after an `888` response.
    pub temporary_error_retry_ms: u64,
    /// How long a submitted request holds off new submissions without a
    /// response.
    pub in_flight_timeout_ms: u64,
    /// Responses that mean the line is not provisioned for VoLTE,
    /// formatted as `"<code>[ <reason fragment>]"`.
    pub volte_provision_errors: Vec<String>,
    /// Responses that mean the line is not provisioned for RCS presence.
    pub rcs_provision_errors: Vec<String>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            debounce_window_ms: DEFAULT_DEBOUNCE_WINDOW.as_millis() as u64,
            max_throttle_delay_ms: DEFAULT_MAX_THROTTLE_DELAY.as_millis() as u64,
            temporary_error_retry_ms: DEFAULT_TEMPORARY_ERROR_RETRY.as_millis() as u64,
            in_flight_timeout_ms: DEFAULT_IN_FLIGHT_TIMEOUT.as_millis() as u64,
            volte_provision_errors: Vec::new(),
            rcs_provision_errors: Vec::new(),
        }
    }
}

impl PublisherConfig {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    pub fn max_throttle_delay(&self) -> Duration {
        Duration::from_millis(self.max_throttle_delay_ms)
    }

    pub fn temporary_error_retry(&self) -> Duration {
        Duration::from_millis(self.temporary_error_retry_ms)
    }

    pub fn in_flight_timeout(&self) -> Duration {
        Duration::from_millis(self.in_flight_timeout_ms)
    }

    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_window_ms == 0 {
            return Err(ConfigError::ZeroDebounceWindow);
        }
        for pattern in self
            .volte_provision_errors
            .iter()
            .chain(self.rcs_provision_errors.iter())
        {
            pattern.parse::<ProvisionErrorPattern>()?;
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_json(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!("[from_file] Loaded publisher config from {}", path.display());
        Ok(config)
    }

    /// Load from the file named by `PRESENCE_PUBLISH_CONFIG`, or use defaults
    /// when the variable is not set.
    pub fn from_env() -> anyhow::Result<Self> {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path),
            Err(_) => {
                info!("[from_env] {CONFIG_PATH_ENV} is not set, using default config");
                Ok(Self::default())
            }
        }
    }
}
