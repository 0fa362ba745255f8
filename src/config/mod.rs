use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Timing of the client-side startup handshake with the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Waits between ownership checks after spawning a detached daemon.
    pub backoff_ms: Vec<u64>,
    /// Pause after the daemon first appears, so it can finish subscribing.
    pub settle_ms: u64,
    /// Interval of the deferred delivery used with `--no-fork METHOD`.
    pub retry_interval_ms: u64,
    /// Extra deferred delivery attempts after the first one.
    pub retry_attempts: usize,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            backoff_ms: vec![200, 300, 400, 400, 1200, 2300],
            settle_ms: 200,
            retry_interval_ms: 400,
            retry_attempts: 5,
        }
    }
}

impl BootstrapConfig {
    pub fn backoff(&self) -> impl Iterator<Item = Duration> + '_ {
        self.backoff_ms.iter().map(|ms| Duration::from_millis(*ms))
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on a single outbound call to a player.
    pub call_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 2000,
        }
    }
}

impl DispatchConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Config {
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mpris-arbiter")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }
}
