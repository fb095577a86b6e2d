//! Settings for loads, the cache root and concrete sources.
//!
//! Settings are merged from three layers, lowest first:
//! 1. Built-in defaults
//! 2. A TOML file (`--config` or `LOCAL_CANDLES_CONFIG`)
//! 3. CLI flags

mod defaults;
mod merge;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::sources::{binance, yahoo};

pub use defaults::{
    builtin_layer, DEFAULT_CACHE_ROOT, DEFAULT_CALLS_PER_SECOND, DEFAULT_COLUMNS,
    DEFAULT_TIMEOUT_SECONDS,
};
pub use merge::{merge_layers, overlay, toml_to_json};

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "LOCAL_CANDLES_CONFIG";

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Directory holding one partition per source slug.
    pub cache_root: PathBuf,

    /// Refetch the frontier page instead of trusting open segments.
    pub reload_latest: bool,

    /// Columns used when a load names none.
    pub default_columns: Vec<String>,

    pub binance: BinanceSettings,

    pub yahoo: YahooSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BinanceSettings {
    pub base_url: String,

    /// Candles per request (1..=1500).
    pub page_limit: i64,

    /// Request rate shared by every Binance source.
    pub calls_per_second: f64,

    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YahooSettings {
    pub base_url: String,

    /// Intervals per request window (1..=5000).
    pub page_limit: i64,

    /// Request rate shared by every Yahoo source.
    pub calls_per_second: f64,

    pub timeout_seconds: u64,
}

impl Settings {
    /// Merge built-in defaults, an optional file and optional CLI
    /// overrides, then validate.
    pub fn build(config_path: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        let mut layers = vec![builtin_layer()];

        if let Some(path) = config_path {
            layers.push(load_toml_file(path)?);
            debug!(path = %path.display(), "loaded settings file");
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
        }

        let settings: Settings = serde_json::from_value(merge_layers(layers))
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;

        Ok(settings)
    }

    /// Settings from a TOML file layered over the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::build(Some(path), None)
    }

    /// Settings from a TOML document layered over the defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let layer = parse_toml(contents)?;
        let settings: Settings = serde_json::from_value(merge_layers([builtin_layer(), layer]))
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_columns.is_empty() {
            return Err(ConfigError::Invalid {
                field: "default_columns",
                reason: "must not be empty".to_string(),
            });
        }

        check_source(
            ["binance.page_limit", "binance.calls_per_second", "binance.timeout_seconds"],
            (self.binance.page_limit, binance::MAX_PAGE_LIMIT),
            self.binance.calls_per_second,
            self.binance.timeout_seconds,
        )?;
        check_source(
            ["yahoo.page_limit", "yahoo.calls_per_second", "yahoo.timeout_seconds"],
            (self.yahoo.page_limit, yahoo::MAX_PAGE_LIMIT),
            self.yahoo.calls_per_second,
            self.yahoo.timeout_seconds,
        )?;

        Ok(())
    }

    /// `default_columns` as string slices.
    pub fn default_column_refs(&self) -> Vec<&str> {
        self.default_columns.iter().map(String::as_str).collect()
    }
}

/// Range checks shared by the per-source sections.
fn check_source(
    [limit_field, rate_field, timeout_field]: [&'static str; 3],
    (page_limit, max_page_limit): (i64, i64),
    calls_per_second: f64,
    timeout_seconds: u64,
) -> Result<(), ConfigError> {
    if !(1..=max_page_limit).contains(&page_limit) {
        return Err(ConfigError::Invalid {
            field: limit_field,
            reason: format!("must be in [1, {}]", max_page_limit),
        });
    }

    if !calls_per_second.is_finite() || calls_per_second <= 0.0 {
        return Err(ConfigError::Invalid {
            field: rate_field,
            reason: "must be a positive number".to_string(),
        });
    }

    if timeout_seconds == 0 {
        return Err(ConfigError::Invalid {
            field: timeout_field,
            reason: "must be positive".to_string(),
        });
    }

    Ok(())
}

fn load_toml_file(path: &Path) -> Result<Value, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_toml(&contents)
}

fn parse_toml(contents: &str) -> Result<Value, ConfigError> {
    let doc: toml::Value =
        toml::from_str(contents).map_err(|e| ConfigError::Parse(format!("TOML parse error: {}", e)))?;
    Ok(toml_to_json(doc))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
