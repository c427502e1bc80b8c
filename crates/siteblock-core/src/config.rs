use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Get the local data directory for siteblock.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("siteblock");
    Ok(path)
}

/// Files the daemon and CLI share inside the data directory
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub database: PathBuf,
    pub socket: PathBuf,
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
    pub config_file: PathBuf,
}

impl DataPaths {
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            database: data_dir.join("siteblock.db"),
            socket: data_dir.join("siteblock.sock"),
            pid_file: data_dir.join("siteblock.pid"),
            log_file: data_dir.join("siteblock.log"),
            config_file: data_dir.join("config.toml"),
        }
    }
}

/// What blocking an already-blocked site does
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Drop the existing entry (and its alarm) before adding the new one
    #[default]
    Replace,
    /// Keep both entries; each gets its own rule
    Append,
}

/// Daemon settings read from `config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound on how long the daemon sleeps between alarm checks
    pub poll_interval_ms: u64,
    /// Priority given to every projected block rule
    pub rule_priority: u32,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            rule_priority: 1,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration, falling back to defaults when the file is absent
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        if config.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }
        Ok(config)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
