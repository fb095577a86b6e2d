//! Built-in settings (lowest layer)

use std::path::PathBuf;

use serde_json::{json, Value};

use super::{BinanceSettings, Settings, YahooSettings};
use crate::sources::{binance, yahoo};

/// Cache root, relative to the working directory.
pub const DEFAULT_CACHE_ROOT: &str = ".local_candles";

/// Columns returned when a load names none.
pub const DEFAULT_COLUMNS: &[&str] = &["open", "high", "low", "close", "volume"];

/// Outbound request rate per source type.
pub const DEFAULT_CALLS_PER_SECOND: f64 = 2.0;

/// HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from(DEFAULT_CACHE_ROOT),
            reload_latest: true,
            default_columns: DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            binance: BinanceSettings::default(),
            yahoo: YahooSettings::default(),
        }
    }
}

impl Default for BinanceSettings {
    fn default() -> Self {
        Self {
            base_url: binance::DEFAULT_BASE_URL.to_string(),
            page_limit: binance::DEFAULT_PAGE_LIMIT,
            calls_per_second: DEFAULT_CALLS_PER_SECOND,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl Default for YahooSettings {
    fn default() -> Self {
        Self {
            base_url: yahoo::DEFAULT_BASE_URL.to_string(),
            page_limit: yahoo::DEFAULT_PAGE_LIMIT,
            calls_per_second: DEFAULT_CALLS_PER_SECOND,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

/// Built-in layer as a JSON value for merging.
pub fn builtin_layer() -> Value {
    let defaults = Settings::default();
    json!({
        "cache_root": defaults.cache_root.to_string_lossy(),
        "reload_latest": defaults.reload_latest,
        "default_columns": defaults.default_columns,
        "binance": {
            "base_url": defaults.binance.base_url,
            "page_limit": defaults.binance.page_limit,
            "calls_per_second": defaults.binance.calls_per_second,
            "timeout_seconds": defaults.binance.timeout_seconds,
        },
        "yahoo": {
            "base_url": defaults.yahoo.base_url,
            "page_limit": defaults.yahoo.page_limit,
            "calls_per_second": defaults.yahoo.calls_per_second,
            "timeout_seconds": defaults.yahoo.timeout_seconds,
        }
    })
}
