//! Configuration loading and path resolution
//!
//! Bootstrap configuration is read from a TOML file located by priority:
//! 1. Command-line argument (highest priority)
//! 2. `ROOFCAL_CONFIG` environment variable
//! 3. `<config_dir>/roofcal/config.toml`
//! 4. Built-in defaults (no file)
//!
//! Every section and field has a built-in default, so a missing or partial
//! file never prevents startup.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "ROOFCAL_CONFIG";

/// Environment variable overriding the calibration database path
pub const DATABASE_ENV_VAR: &str = "ROOFCAL_DATABASE_PATH";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path to the SQLite calibration database (optional)
    ///
    /// If not specified: environment → OS default
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Tiered resolver defaults
    #[serde(default)]
    pub resolver: ResolverSettings,

    /// Self-learning calibrator thresholds
    #[serde(default)]
    pub calibration: CalibrationSettings,

    /// Multi-source consensus flag thresholds
    #[serde(default)]
    pub consensus: ConsensusSettings,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Resolver defaults used by the estimated-pitch tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Pitch assumed when no source reports one (rise per 12 run)
    #[serde(default = "default_pitch_rise")]
    pub default_pitch_rise: f64,

    /// Segment count assumed when no geometry is available
    #[serde(default = "default_segment_count")]
    pub default_segment_count: u32,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            default_pitch_rise: default_pitch_rise(),
            default_segment_count: default_segment_count(),
        }
    }
}

/// Calibration model thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationSettings {
    /// Minimum effective samples before a correction is applied
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Samples required for a high-confidence recommendation
    #[serde(default = "default_high_confidence_samples")]
    pub high_confidence_samples: usize,

    /// Data points older than this are excluded from the model
    #[serde(default = "default_max_age_days")]
    pub max_age_days: f64,

    /// Points further than this many standard deviations from the mean are outliers
    #[serde(default = "default_outlier_sigma")]
    pub outlier_sigma: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            high_confidence_samples: default_high_confidence_samples(),
            max_age_days: default_max_age_days(),
            outlier_sigma: default_outlier_sigma(),
        }
    }
}

/// Consensus quality flag thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusSettings {
    /// Footprint coefficient of variation (%) above which the set is flagged
    #[serde(default = "default_variance_flag_percent")]
    pub variance_flag_percent: f64,

    /// Cloud cover (%) above which a source is flagged
    #[serde(default = "default_cloud_cover_flag_percent")]
    pub cloud_cover_flag_percent: f64,
}

impl Default for ConsensusSettings {
    fn default() -> Self {
        Self {
            variance_flag_percent: default_variance_flag_percent(),
            cloud_cover_flag_percent: default_cloud_cover_flag_percent(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_pitch_rise() -> f64 {
    6.0
}

fn default_segment_count() -> u32 {
    4
}

fn default_min_samples() -> usize {
    3
}

fn default_high_confidence_samples() -> usize {
    5
}

fn default_max_age_days() -> f64 {
    365.0
}

fn default_outlier_sigma() -> f64 {
    2.0
}

fn default_variance_flag_percent() -> f64 {
    15.0
}

fn default_cloud_cover_flag_percent() -> f64 {
    50.0
}

impl EngineConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load configuration from the resolved file, or defaults if none exists
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        Self::load_resolved(cli_arg).map(|(config, _)| config)
    }

    /// Like `load`, also returning the file the configuration came from
    ///
    /// Callers log the path once their tracing subscriber is installed.
    pub fn load_resolved(cli_arg: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        match resolve_config_path(cli_arg) {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Read {} failed: {}", path.display(), e))
                })?;
                let config = Self::from_toml_str(&content)?;
                Ok((config, Some(path)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    /// Resolve the calibration database path
    ///
    /// Priority: environment variable → TOML → OS default
    pub fn database_path(&self) -> PathBuf {
        if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.database_path {
            return path.clone();
        }

        default_data_folder().join("calibration.db")
    }
}

/// Resolve the configuration file path
///
/// An explicit CLI path or environment path is returned even if it does not
/// exist, so the caller reports the read failure instead of silently
/// falling back to defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    let user_config = dirs::config_dir().map(|d| d.join("roofcal").join("config.toml"))?;
    if user_config.exists() {
        Some(user_config)
    } else {
        None
    }
}

/// Get OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("roofcal"))
        .unwrap_or_else(|| PathBuf::from("./roofcal_data"))
}
