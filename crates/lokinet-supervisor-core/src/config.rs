//! Supervisor configuration.
//!
//! Configuration is validated at load time (Poka-Yoke), with sensible
//! defaults and clear error messages.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::LaunchSpec;
use crate::error::ConfigError;
use crate::types::humantime_serde;

/// Upper bound for every configured interval and timeout.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Supervisor configuration.
///
/// The host application owns this; the supervisor only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Name used in log fields (must be a valid identifier).
    #[serde(default = "default_name")]
    pub name: String,

    /// Path to the daemon binary.
    pub executable_path: PathBuf,

    /// Command-line arguments.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment variables.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Working directory.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Refuse to spawn unless running with root/administrator rights.
    ///
    /// lokinet creates a tun device and rewrites routes, neither of which
    /// works unprivileged.
    #[serde(default = "default_true")]
    pub require_elevation: bool,

    /// How often the exit watcher and stop loop poll the process.
    #[serde(default = "default_poll_interval")]
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Graceful stop timeout used by `shutdown()`.
    #[serde(default = "default_stop_timeout")]
    #[serde(with = "humantime_serde")]
    pub stop_timeout: Duration,

    /// How long to wait for a killed process to be reaped.
    #[serde(default = "default_kill_timeout")]
    #[serde(with = "humantime_serde")]
    pub kill_timeout: Duration,

    /// Number of lifecycle events kept for diagnostics.
    #[serde(default = "default_event_log_capacity")]
    pub event_log_capacity: usize,
}

fn default_name() -> String {
    "lokinet".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_kill_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_event_log_capacity() -> usize {
    256
}

impl SupervisorConfig {
    /// Creates a configuration with required fields.
    #[must_use]
    pub fn new(executable_path: impl Into<PathBuf>) -> Self {
        Self {
            name: default_name(),
            executable_path: executable_path.into(),
            args: vec![],
            env: HashMap::new(),
            working_dir: None,
            require_elevation: default_true(),
            poll_interval: default_poll_interval(),
            stop_timeout: default_stop_timeout(),
            kill_timeout: default_kill_timeout(),
            event_log_capacity: default_event_log_capacity(),
        }
    }

    /// Sets the daemon arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets whether elevated privileges are required.
    #[must_use]
    pub const fn with_require_elevation(mut self, required: bool) -> Self {
        self.require_elevation = required;
        self
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the graceful stop timeout.
    #[must_use]
    pub const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Sets the kill confirmation timeout.
    #[must_use]
    pub const fn with_kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::invalid("name cannot be empty"));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::invalid(
                "name must contain only alphanumeric characters, hyphens, and underscores",
            ));
        }

        if self.executable_path.as_os_str().is_empty() {
            return Err(ConfigError::invalid("executable_path cannot be empty"));
        }

        if self.poll_interval.is_zero() {
            return Err(ConfigError::invalid("poll_interval must be greater than 0"));
        }
        if self.kill_timeout.is_zero() {
            return Err(ConfigError::invalid("kill_timeout must be greater than 0"));
        }
        for (field, value) in [
            ("poll_interval", self.poll_interval),
            ("stop_timeout", self.stop_timeout),
            ("kill_timeout", self.kill_timeout),
        ] {
            if value > MAX_TIMEOUT {
                return Err(ConfigError::invalid(format!(
                    "{field} must not exceed {}",
                    humantime::format_duration(MAX_TIMEOUT)
                )));
            }
        }
        if self.event_log_capacity == 0 {
            return Err(ConfigError::invalid(
                "event_log_capacity must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the string cannot be parsed or validated.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the launch spec handed to the backend.
    #[must_use]
    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            executable: self.executable_path.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            working_dir: self.working_dir.clone(),
            require_elevation: self.require_elevation,
        }
    }
}
