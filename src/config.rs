//! Server configuration, loaded from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::activity::IdlePolicy;

/// Top-level config. Every field is optional; absent fields fall back to
/// built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path of the Unix control socket.
    pub socket_path: Option<PathBuf>,
    /// Shell spawned into new panes (overrides `$SHELL`).
    pub shell: Option<String>,
    /// Default width for sessions created without an `x` flag.
    pub default_width: Option<u16>,
    /// Default height for sessions created without a `y` flag.
    pub default_height: Option<u16>,
    /// Number of command workers.
    pub workers: Option<usize>,
    /// Idle detection tuning.
    pub idle: Option<IdleConfig>,
}

/// Idle detection section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdleConfig {
    /// Seconds of inactivity before a session is considered idle.
    pub threshold_secs: Option<u64>,
    /// Poll interval in seconds while any session is active.
    pub active_check_secs: Option<u64>,
    /// Poll interval in seconds while everything is idle.
    pub idle_check_secs: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {0}: {1}")]
    ReadFailed(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config {0}: {1}")]
    ParseFailed(PathBuf, #[source] toml::de::Error),
}

impl Config {
    /// Load config from a TOML file path. Returns `Ok(None)` if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?;
        Ok(Some(config))
    }

    /// The idle policy this config describes, defaults filled in.
    pub fn idle_policy(&self) -> IdlePolicy {
        let defaults = IdlePolicy::default();
        let idle = self.idle.clone().unwrap_or_default();
        IdlePolicy {
            idle_threshold: idle
                .threshold_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_threshold),
            active_check_interval: idle
                .active_check_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.active_check_interval),
            idle_check_interval: idle
                .idle_check_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_check_interval),
        }
    }

    /// Default session size, `(width, height)`.
    pub fn default_size(&self) -> (u16, u16) {
        (
            self.default_width.unwrap_or(80),
            self.default_height.unwrap_or(24),
        )
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or(4)
    }
}
