//! Tunable thresholds for reconstruction, classification, and trends.
//!
//! Resolution order (highest wins):
//! 1. `FLOWLENS_TZ` env var (default timezone only)
//! 2. `<project>/.flowlens/config.toml`
//! 3. `<config dir>/flowlens/config.toml`
//! 4. Built-in defaults
//!
//! Every field has a serde default, so a config file only needs the keys
//! it overrides.

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::FlowError;

/// Env var that overrides the default reporting timezone.
pub const TZ_ENV_VAR: &str = "FLOWLENS_TZ";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FlowConfig {
    #[serde(default)]
    pub timeline: TimelineConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub trend: TrendConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineConfig {
    /// Day difference above which two adjacent snapshots count as a gap.
    #[serde(default = "default_gap_threshold_days")]
    pub gap_threshold_days: f64,
    /// IANA timezone used when a query does not name one.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            gap_threshold_days: default_gap_threshold_days(),
            default_timezone: default_timezone(),
        }
    }
}

impl TimelineConfig {
    /// Parse [`Self::default_timezone`].
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidTimezone`] for names chrono-tz does not know.
    pub fn timezone(&self) -> Result<Tz, FlowError> {
        parse_timezone(&self.default_timezone)
    }
}

/// Thresholds for variability and distribution shape classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsConfig {
    /// `p98 / p50` above this ratio is high variability.
    #[serde(default = "default_high_variability_ratio")]
    pub high_variability_ratio: f64,
    /// `p50 / p98` below this ratio is a skewed (long-tailed) distribution.
    #[serde(default = "default_skewed_median_ratio")]
    pub skewed_median_ratio: f64,
    /// Percentile reported as the headline number for a population.
    #[serde(default = "default_headline_percentile")]
    pub headline_percentile: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            high_variability_ratio: default_high_variability_ratio(),
            skewed_median_ratio: default_skewed_median_ratio(),
            headline_percentile: default_headline_percentile(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Absolute percentage change at or below which a trend is stable.
    #[serde(default = "default_stable_band_percent")]
    pub stable_band_percent: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            stable_band_percent: default_stable_band_percent(),
        }
    }
}

/// Parse an IANA timezone name.
///
/// # Errors
///
/// Returns [`FlowError::InvalidTimezone`] when the name is unknown.
pub fn parse_timezone(name: &str) -> Result<Tz, FlowError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| FlowError::InvalidTimezone(name.to_string()))
}

/// Load `<project_root>/.flowlens/config.toml`, or `None` when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<Option<FlowConfig>> {
    load_file(&project_root.join(".flowlens/config.toml"))
}

/// Load the per-user config from the platform config directory.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<Option<FlowConfig>> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(None);
    };
    load_file(&config_dir.join("flowlens/config.toml"))
}

/// Resolve the effective config for a project root.
///
/// # Errors
///
/// Returns an error if a config file is malformed or `FLOWLENS_TZ` names
/// an unknown timezone.
pub fn resolve_config(project_root: &Path) -> Result<FlowConfig> {
    let mut config = match load_project_config(project_root)? {
        Some(config) => config,
        None => load_user_config()?.unwrap_or_default(),
    };
    config.apply_env_override(std::env::var(TZ_ENV_VAR).ok())?;
    Ok(config)
}

impl FlowConfig {
    /// Apply the timezone override, validating it before it is stored.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::InvalidTimezone`] for an unknown name.
    pub fn apply_env_override(&mut self, tz: Option<String>) -> Result<(), FlowError> {
        if let Some(name) = tz.filter(|name| !name.trim().is_empty()) {
            parse_timezone(&name)?;
            self.timeline.default_timezone = name.trim().to_string();
        }
        Ok(())
    }
}

fn load_file(path: &Path) -> Result<Option<FlowConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<FlowConfig>(&content).map_err(|err| FlowError::ConfigParse {
        path: path.display().to_string(),
        message: err.message().to_string(),
    })?;
    Ok(Some(config))
}

const fn default_gap_threshold_days() -> f64 {
    1.1
}

fn default_timezone() -> String {
    "UTC".to_string()
}

const fn default_high_variability_ratio() -> f64 {
    5.6
}

const fn default_skewed_median_ratio() -> f64 {
    0.35
}

const fn default_headline_percentile() -> f64 {
    85.0
}

const fn default_stable_band_percent() -> f64 {
    5.0
}
