use crate::aggregate::Aggregation;
use crate::error::{PingError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;

pub const MAX_PROBES_PER_PAIR: u32 = 5;

/// Order in which a pass visits the (provider, region) pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Catalog,
    /// Fresh random order every pass, so early regions are not favoured
    Shuffle,
}

/// What to do with a probe that hit the timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutPolicy {
    /// Drop the sample
    #[default]
    Discard,
    /// Keep the elapsed time as a worst-case sample
    Record,
}

/// Runtime tuning, read from `config.toml` and overridden by CLI flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub aggregate: Aggregation,
    pub order: Order,
    pub timeout_policy: TimeoutPolicy,
    /// Per-probe timeout
    pub timeout_ms: u64,
    /// Pause between two full passes
    pub interval_ms: u64,
    /// Pause before the very first pass
    pub settle_ms: u64,
    /// Probes per pair per pass; the lowest one is kept
    pub probes_per_pair: u32,
    /// Forget all samples whenever the filter changes
    pub reset_on_restart: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            aggregate: Aggregation::Median,
            order: Order::Catalog,
            timeout_policy: TimeoutPolicy::Discard,
            timeout_ms: 2000,
            interval_ms: 500,
            settle_ms: 500,
            probes_per_pair: 1,
            reset_on_restart: false,
        }
    }
}

impl Settings {
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "webping").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from the user config file, or defaults when there is none.
    pub async fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path).await,
            None => Ok(Self::default()),
        }
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).await?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        info!(path = ?path, "Loaded settings");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(PingError::InvalidSettings(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.interval_ms == 0 {
            return Err(PingError::InvalidSettings(
                "interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.probes_per_pair == 0 || self.probes_per_pair > MAX_PROBES_PER_PAIR {
            return Err(PingError::InvalidSettings(format!(
                "probes_per_pair must be between 1 and {}",
                MAX_PROBES_PER_PAIR
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() -> Result<()> {
        let dir = tempdir()?;
        let settings = Settings::load_from(&dir.path().join("config.toml")).await?;
        assert_eq!(settings, Settings::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "aggregate = \"minimum\"\norder = \"shuffle\"\ntimeout_policy = \"record\"\nprobes_per_pair = 2\n",
        )
        .await?;

        let settings = Settings::load_from(&path).await?;
        assert_eq!(settings.aggregate, Aggregation::Minimum);
        assert_eq!(settings.order, Order::Shuffle);
        assert_eq!(settings.timeout_policy, TimeoutPolicy::Record);
        assert_eq!(settings.probes_per_pair, 2);
        assert_eq!(settings.timeout_ms, 2000);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_file_rejected() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "probes_per_pair = 9\n").await?;
        assert!(matches!(
            Settings::load_from(&path).await,
            Err(PingError::InvalidSettings(_))
        ));

        fs::write(&path, "timeout_ms = \"soon\"\n").await?;
        assert!(matches!(
            Settings::load_from(&path).await,
            Err(PingError::TomlDe(_))
        ));
        Ok(())
    }

    #[test]
    fn test_validate() {
        let mut settings = Settings::default();
        assert!(settings.validate().is_ok());
        settings.interval_ms = 0;
        assert!(settings.validate().is_err());
    }
}
