/// Application configuration management
/// Stores user preferences in <config dir>/stack-telemetry/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::constants::{
    CRITICAL_INTERVAL, DEFAULT_BASE_URL, HIGH_INTERVAL, MEDIUM_INTERVAL,
};

/// Tier interval overrides, as humantime strings ("1s", "500ms", "2m")
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TierOverrides {
    pub critical: Option<String>,
    pub high: Option<String>,
    pub medium: Option<String>,
}

/// Resolved tier intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierIntervals {
    pub critical: Duration,
    pub high: Duration,
    pub medium: Duration,
}

impl Default for TierIntervals {
    fn default() -> Self {
        Self {
            critical: CRITICAL_INTERVAL,
            high: HIGH_INTERVAL,
            medium: MEDIUM_INTERVAL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub request_timeout: String,
    pub log_level: String,
    pub tiers: TierOverrides,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: "10s".to_string(),
            log_level: "info".to_string(),
            tiers: TierOverrides::default(),
        }
    }
}

impl AppConfig {
    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("STACK_TELEMETRY_CONFIG") {
            return Ok(PathBuf::from(path));
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine the user config directory")?
            .join("stack-telemetry");

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from the default location, then apply env overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_or_create(&path)?;

        if let Ok(base_url) = std::env::var("STACK_TELEMETRY_BASE_URL") {
            config.base_url = base_url;
        }

        Ok(config)
    }

    /// Load configuration from a specific file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(config)
    }

    /// Load `path`, first writing the defaults there if it does not exist yet
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }
        Self::load_from(path)
    }

    /// Save configuration to a specific file, creating its directory
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize config")?;

        fs::write(path, contents)
            .context("Failed to write config file")?;

        Ok(())
    }

    pub fn request_timeout(&self) -> Result<Duration> {
        humantime::parse_duration(&self.request_timeout)
            .with_context(|| format!("Invalid request_timeout '{}'", self.request_timeout))
    }

    /// Tier intervals with overrides applied
    pub fn tier_intervals(&self) -> Result<TierIntervals> {
        let defaults = TierIntervals::default();
        Ok(TierIntervals {
            critical: parse_override("tiers.critical", &self.tiers.critical, defaults.critical)?,
            high: parse_override("tiers.high", &self.tiers.high, defaults.high)?,
            medium: parse_override("tiers.medium", &self.tiers.medium, defaults.medium)?,
        })
    }
}

fn parse_override(field: &str, value: &Option<String>, default: Duration) -> Result<Duration> {
    match value {
        None => Ok(default),
        Some(raw) => {
            let parsed = humantime::parse_duration(raw)
                .with_context(|| format!("Invalid {} '{}'", field, raw))?;
            if parsed.is_zero() {
                anyhow::bail!("{} must be greater than zero", field);
            }
            Ok(parsed)
        }
    }
}
