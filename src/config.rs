//! Configuration loading.
//!
//! Handles parsing of `config.toml` in the data directory (or a path passed via
//! `--config`). Every field has a default, so a missing file is the default config.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::PollBackoff;
use crate::error::{Error, Result};
use crate::fields::WeeklyExpansion;
use crate::task::unknown_user;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub user: UserConfig,

    #[serde(default)]
    pub window: WindowConfig,

    #[serde(default)]
    pub instancing: InstancingConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

/// Identity used for `completed_by` and "my tasks first" ordering.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserConfig {
    /// Partner name as it appears in `assigned_partners`.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub email: Option<String>,
}

impl UserConfig {
    /// Identity recorded on completion records.
    pub fn actor(&self) -> String {
        self.email.clone().or_else(|| self.name.clone()).unwrap_or_else(unknown_user)
    }
}

/// Default listing window relative to today.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WindowConfig {
    #[serde(default = "default_weeks_back")]
    pub weeks_back: u32,

    #[serde(default = "default_weeks_ahead")]
    pub weeks_ahead: u32,
}

fn default_weeks_back() -> u32 {
    1
}

fn default_weeks_ahead() -> u32 {
    2
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            weeks_back: default_weeks_back(),
            weeks_ahead: default_weeks_ahead(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InstancingConfig {
    #[serde(default)]
    pub weekly_days: WeeklyExpansion,
}

/// Recheck interval for `watch`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchConfig {
    #[serde(default = "default_base_secs")]
    pub base_secs: u64,

    #[serde(default = "default_max_secs")]
    pub max_secs: u64,
}

fn default_base_secs() -> u64 {
    10
}

fn default_max_secs() -> u64 {
    60
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            base_secs: default_base_secs(),
            max_secs: default_max_secs(),
        }
    }
}

impl WatchConfig {
    pub fn backoff(&self) -> PollBackoff {
        PollBackoff::new(Duration::from_secs(self.base_secs.max(1)), Duration::from_secs(self.max_secs))
    }
}

impl Config {
    /// Load configuration from `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| Error::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}
