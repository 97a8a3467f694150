//! Bridge configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

/// Configurable timeout values (seconds) for blocking exchanges.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[allow(clippy::struct_field_names)]
pub struct TimeoutConfig {
    /// Ordinary outbound request timeout (capability calls, catalog query).
    #[serde(default = "default_request_seconds")]
    pub request_seconds: u64,
    /// Permission round-trip timeout; an unanswered request resolves as a
    /// rejection when this elapses.
    #[serde(default = "default_permission_seconds")]
    pub permission_seconds: u64,
}

fn default_request_seconds() -> u64 {
    60
}

fn default_permission_seconds() -> u64 {
    300
}

/// Idle-sweep and disconnect-grace settings for the session registry.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[allow(clippy::struct_field_names)]
pub struct SweepConfig {
    /// Interval between sweep passes.
    #[serde(default = "default_sweep_interval_seconds")]
    pub interval_seconds: u64,
    /// Idle time after which a connected session becomes eligible for
    /// eviction.
    #[serde(default = "default_idle_seconds")]
    pub idle_seconds: u64,
    /// Grace window after the owning transport disconnects before a session
    /// is evicted; a `session/resume` within the window rescues it.
    #[serde(default = "default_disconnect_grace_seconds")]
    pub disconnect_grace_seconds: u64,
}

fn default_sweep_interval_seconds() -> u64 {
    30
}

fn default_idle_seconds() -> u64 {
    1800
}

fn default_disconnect_grace_seconds() -> u64 {
    60
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_sweep_interval_seconds(),
            idle_seconds: default_idle_seconds(),
            disconnect_grace_seconds: default_disconnect_grace_seconds(),
        }
    }
}

/// Global bridge configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BridgeConfig {
    /// Named pipe / Unix socket identifier for the socket transport.
    #[serde(default = "default_socket_name")]
    pub socket_name: String,
    /// Timeout configuration for blocking flows.
    #[serde(default = "default_timeouts")]
    pub timeouts: TimeoutConfig,
    /// Idle-sweep configuration.
    #[serde(default)]
    pub sweep: SweepConfig,
}

fn default_socket_name() -> String {
    "agent-bridge".into()
}

fn default_timeouts() -> TimeoutConfig {
    TimeoutConfig {
        request_seconds: default_request_seconds(),
        permission_seconds: default_permission_seconds(),
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            socket_name: default_socket_name(),
            timeouts: default_timeouts(),
            sweep: SweepConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Ordinary outbound request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.request_seconds)
    }

    /// Permission round-trip timeout.
    #[must_use]
    pub fn permission_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.permission_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.socket_name.trim().is_empty() {
            return Err(AppError::Config("socket_name must not be empty".into()));
        }
        if self.timeouts.request_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.request_seconds must be greater than zero".into(),
            ));
        }
        if self.timeouts.permission_seconds == 0 {
            return Err(AppError::Config(
                "timeouts.permission_seconds must be greater than zero".into(),
            ));
        }
        if self.sweep.interval_seconds == 0 {
            return Err(AppError::Config(
                "sweep.interval_seconds must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
