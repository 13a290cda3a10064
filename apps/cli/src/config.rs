//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/pitchdeck/cli.toml`
//! - Windows: `%APPDATA%/pitchdeck/cli.toml`
//!
//! `PITCHDECK_API_URL` and `PITCHDECK_WS_URL` override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use pitchdeck_job_connection::{ChannelConfig, ReconnectPolicy};
use pitchdeck_protocol::constants::{DEFAULT_API_URL, DEFAULT_WS_URL, RECONNECT_DELAY};

pub const API_URL_ENV: &str = "PITCHDECK_API_URL";
pub const WS_URL_ENV: &str = "PITCHDECK_WS_URL";

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// REST base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// WebSocket base URL for job status streams.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Seconds between a dropped status stream and the next attempt.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.into()
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.into()
}

fn default_reconnect_delay_secs() -> u64 {
    RECONNECT_DELAY.as_secs()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ws_url: default_ws_url(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl Config {
    /// Loads configuration, then applies environment overrides.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// read if present and a default file is written otherwise.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::read(path)?,
            None => {
                let path = config_path()?;
                if path.exists() {
                    Self::read(&path)?
                } else {
                    let config = Config::default();
                    if let Err(e) = config.save(&path) {
                        tracing::debug!(error = %e, "could not write default configuration");
                    }
                    config
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the status channel cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.reconnect_delay_secs == 0 {
            anyhow::bail!("reconnect_delay_secs must be at least 1");
        }
        Ok(())
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Replaces URLs with non-empty values from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_url = url;
        }
        if let Some(url) = lookup(WS_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.ws_url = url;
        }
    }

    /// Status channel settings derived from this configuration.
    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            ws_base_url: self.ws_url.clone(),
            reconnect: ReconnectPolicy::fixed(Duration::from_secs(self.reconnect_delay_secs)),
        }
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("pitchdeck").join("cli.toml"))
    }

    #[cfg(not(target_os = "windows"))]
    {
        let home = std::env::var("HOME").context("HOME is not set")?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("pitchdeck")
            .join("cli.toml"))
    }
}
