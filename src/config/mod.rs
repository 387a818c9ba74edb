//! Configuration management for clinical-etl
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory that relative CSV filenames are resolved against
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Quality rule configuration
    #[serde(default)]
    pub quality: QualityConfig,

    /// Job runner configuration
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Maximum pooled SQLite connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a connection waits for the SQLite write lock
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Inclusive numeric bounds for one measurement type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    pub low: f64,
    pub high: f64,
}

impl RangeBounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

/// Quality rule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Measurement types whose rows must carry a unit
    #[serde(default = "default_required_unit_types")]
    pub required_unit_types: Vec<String>,

    /// Count quality scores that are unparseable or outside [0, 1]
    #[serde(default = "default_check_quality_score")]
    pub check_quality_score: bool,

    /// Plausible numeric range per measurement type
    #[serde(default = "default_ranges")]
    pub ranges: BTreeMap<String, RangeBounds>,
}

/// Job runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Status polling interval used by `run` (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for clinical-etl data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: DatabaseConfig::default(),
            quality: QualityConfig::default(),
            jobs: JobsConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            required_unit_types: default_required_unit_types(),
            ranges: default_ranges(),
            check_quality_score: default_check_quality_score(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl QualityConfig {
    /// Required-unit types as a lookup set
    pub fn required_unit_set(&self) -> HashSet<&str> {
        self.required_unit_types.iter().map(String::as_str).collect()
    }
}

impl Config {
    /// Get the default base directory (~/.clinical-etl)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".clinical-etl")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub(crate) fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("etl.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("etl.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Check if clinical-etl is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Resolve a submitted filename to an existing CSV file
    pub fn resolve_input(&self, filename: &str) -> Result<PathBuf> {
        let candidate = Path::new(filename);
        let path = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.data_dir.join(candidate)
        };

        if !path.is_file() {
            return Err(Error::InvalidPath(format!(
                "{}: not a file",
                path.display()
            )));
        }
        Ok(path)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.max_connections == 0 {
            return Err(Error::Config(
                "database.max_connections must be positive".to_string(),
            ));
        }

        if self.database.busy_timeout_ms == 0 {
            return Err(Error::Config(
                "database.busy_timeout_ms must be positive".to_string(),
            ));
        }

        if self.jobs.poll_interval_ms == 0 {
            return Err(Error::Config(
                "jobs.poll_interval_ms must be positive".to_string(),
            ));
        }

        if self
            .quality
            .required_unit_types
            .iter()
            .any(|t| t.trim().is_empty())
        {
            return Err(Error::Config(
                "quality.required_unit_types must not contain blank names".to_string(),
            ));
        }

        for (name, bounds) in &self.quality.ranges {
            if name.trim().is_empty() {
                return Err(Error::Config(
                    "quality.ranges keys must not be blank".to_string(),
                ));
            }
            if !bounds.low.is_finite() || !bounds.high.is_finite() || bounds.low > bounds.high {
                return Err(Error::Config(format!(
                    "quality.ranges.{} must have finite low <= high",
                    name
                )));
            }
        }

        Ok(())
    }
}
