//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - refseeker.toml (default configuration)
//! - refseeker.local.toml (git-ignored local overrides)
//! - Environment variables (REFSEEKER_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # refseeker.toml
//! [discovery]
//! max_uac_attributes = 3
//!
//! [discovery.primary_keys]
//! max_value_length = 10
//! name_suffix = ["id", "key", "nr"]
//!
//! [discovery.inclusion_dependencies]
//! speed_mode = 0
//! find_max_ind = false
//!
//! [discovery.metrics]
//! pk_metric = "hopf"
//! fk_metric = "hopf"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! REFSEEKER_DISCOVERY__MAX_UAC_ATTRIBUTES=4
//! REFSEEKER_DISCOVERY__INCLUSION_DEPENDENCIES__SPEED_MODE=8
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::DiscoveryError;

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Discovery pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Cap on the number of attributes in a unique attribute combination
    #[serde(default = "default_max_uac_attributes")]
    pub max_uac_attributes: usize,

    #[serde(default)]
    pub primary_keys: PrimaryKeyConfig,

    #[serde(default)]
    pub inclusion_dependencies: IndConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Primary-key scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryKeyConfig {
    /// Length above which the value-length score component starts to decay
    #[serde(default = "default_max_value_length")]
    pub max_value_length: u32,

    /// Lowercase name suffixes that score as primary-key-like
    #[serde(default = "default_name_suffix")]
    pub name_suffix: Vec<String>,
}

/// Inclusion-dependency search configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndConfig {
    /// 0 enables exact verification after the sampling pre-test; 1..=10 use
    /// sampling only, with `(11 - speed_mode) * 3` samples per candidate
    #[serde(default)]
    pub speed_mode: u8,

    /// Also search for maximal INDs across all attributes
    #[serde(default)]
    pub find_max_ind: bool,
}

/// Which score families drive the final selection
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetricsConfig {
    #[serde(default)]
    pub pk_metric: PkMetric,
    #[serde(default)]
    pub fk_metric: FkMetric,
}

/// Primary-key score family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PkMetric {
    #[default]
    Hopf,
    Iris,
}

/// Foreign-key probability metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FkMetric {
    #[default]
    Hopf,
    Iris,
    HybridOnlyName,
    Hybrid,
}

/// Report export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Where the JSON report is written
    #[serde(default = "default_export_path")]
    pub file_path: PathBuf,
}

/// HTTP job surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listen address for the job server
    #[serde(default = "default_http_addr")]
    pub addr: String,

    /// Directory holding per-job result files
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_max_uac_attributes() -> usize {
    3
}
fn default_max_value_length() -> u32 {
    10
}
fn default_name_suffix() -> Vec<String> {
    vec!["id".to_string(), "key".to_string(), "nr".to_string()]
}
fn default_export_path() -> PathBuf {
    PathBuf::from("./results/result.json")
}
fn default_http_addr() -> String {
    "127.0.0.1:8001".to_string()
}
fn default_results_dir() -> PathBuf {
    PathBuf::from("./results")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. refseeker.toml (base configuration)
    /// 2. refseeker.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (REFSEEKER_* prefix)
    pub fn load() -> Result<Self, DiscoveryError> {
        let config: Config = Figment::new()
            .merge(Toml::file("refseeker.toml"))
            .merge(Toml::file("refseeker.local.toml"))
            .merge(Env::prefixed("REFSEEKER_").split("__"))
            .extract()
            .map_err(|e| DiscoveryError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, DiscoveryError> {
        let config: Config = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("REFSEEKER_").split("__"))
            .extract()
            .map_err(|e| DiscoveryError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check option ranges. Fatal before any stage runs.
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.discovery.max_uac_attributes < 1 {
            return Err(DiscoveryError::Configuration(
                "discovery.max_uac_attributes must be at least 1".to_string(),
            ));
        }
        if self.discovery.inclusion_dependencies.speed_mode > 10 {
            return Err(DiscoveryError::Configuration(format!(
                "discovery.inclusion_dependencies.speed_mode must be in 0..=10, got {}",
                self.discovery.inclusion_dependencies.speed_mode
            )));
        }
        if self
            .discovery
            .primary_keys
            .name_suffix
            .iter()
            .any(|s| s.chars().any(char::is_uppercase))
        {
            return Err(DiscoveryError::Configuration(
                "discovery.primary_keys.name_suffix entries must be lowercase".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig {
            max_uac_attributes: default_max_uac_attributes(),
            primary_keys: PrimaryKeyConfig::default(),
            inclusion_dependencies: IndConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for PrimaryKeyConfig {
    fn default() -> Self {
        PrimaryKeyConfig {
            max_value_length: default_max_value_length(),
            name_suffix: default_name_suffix(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            file_path: default_export_path(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            addr: default_http_addr(),
            results_dir: default_results_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl IndConfig {
    /// Number of sampled entries per n-ary candidate.
    pub fn num_samples(&self) -> usize {
        if self.speed_mode == 0 {
            3
        } else {
            (11 - self.speed_mode as usize) * 3
        }
    }

    /// Exact verification runs only in speed mode 0.
    pub fn exact_verification(&self) -> bool {
        self.speed_mode == 0
    }
}
