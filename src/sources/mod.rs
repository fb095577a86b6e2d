//! Concrete candle sources and the registry that builds them by name.

pub mod binance;
pub mod rate_limit;
pub mod transport;
pub mod yahoo;

use std::sync::Arc;
use std::time::Duration;

use candles_core::{Interval, Source};
use thiserror::Error;
use tracing::debug;

use crate::config::{BinanceSettings, Settings, YahooSettings};

pub use binance::{BinanceUsdmFuturesSource, BINANCE_USDM_FUTURES_OHLC};
pub use rate_limit::RateLimiter;
pub use transport::{HttpTransport, KlineTransport};
pub use yahoo::{YahooFinanceOhlcSource, YAHOO_FINANCE_OHLC};

/// Names accepted by [`SourceRegistry::build`].
pub const SOURCE_NAMES: &[&str] = &[BINANCE_USDM_FUTURES_OHLC, YAHOO_FINANCE_OHLC];

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown source '{name}' (known: {known})")]
    UnknownSource { name: String, known: String },

    #[error("failed to initialize source '{name}': {reason}")]
    Init { name: String, reason: String },
}

/// Identifies one source instance: a registered name plus its market.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub name: String,
    pub symbol: String,
    pub interval: Interval,
}

impl SourceSpec {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            interval,
        }
    }
}

/// Builds sources from [`SourceSpec`]s.
///
/// Every source of one type built by the same registry shares a single
/// [`RateLimiter`].
pub struct SourceRegistry {
    binance: BinanceSettings,
    binance_limiter: Arc<RateLimiter>,
    yahoo: YahooSettings,
    yahoo_limiter: Arc<RateLimiter>,
}

impl SourceRegistry {
    pub fn new(settings: &Settings) -> Self {
        Self {
            binance: settings.binance.clone(),
            binance_limiter: Arc::new(RateLimiter::new(settings.binance.calls_per_second)),
            yahoo: settings.yahoo.clone(),
            yahoo_limiter: Arc::new(RateLimiter::new(settings.yahoo.calls_per_second)),
        }
    }

    pub fn names(&self) -> &'static [&'static str] {
        SOURCE_NAMES
    }

    pub fn build(&self, spec: &SourceSpec) -> Result<Box<dyn Source>, RegistryError> {
        let source: Box<dyn Source> = match spec.name.as_str() {
            BINANCE_USDM_FUTURES_OHLC => {
                let transport = http_transport(spec, self.binance.timeout_seconds)?;
                Box::new(
                    BinanceUsdmFuturesSource::new(
                        spec.symbol.clone(),
                        spec.interval,
                        Box::new(transport),
                        Arc::clone(&self.binance_limiter),
                    )
                    .with_base_url(self.binance.base_url.clone())
                    .with_limit(self.binance.page_limit),
                )
            }
            YAHOO_FINANCE_OHLC => {
                let transport = http_transport(spec, self.yahoo.timeout_seconds)?;
                Box::new(
                    YahooFinanceOhlcSource::new(
                        spec.symbol.clone(),
                        spec.interval,
                        Box::new(transport),
                        Arc::clone(&self.yahoo_limiter),
                    )
                    .with_base_url(self.yahoo.base_url.clone())
                    .with_limit(self.yahoo.page_limit),
                )
            }
            other => {
                return Err(RegistryError::UnknownSource {
                    name: other.to_string(),
                    known: SOURCE_NAMES.join(", "),
                })
            }
        };

        debug!(slug = %source.slug(), "built source");
        Ok(source)
    }
}

fn http_transport(spec: &SourceSpec, timeout_seconds: u64) -> Result<HttpTransport, RegistryError> {
    HttpTransport::new(Duration::from_secs(timeout_seconds)).map_err(|e| RegistryError::Init {
        name: spec.name.clone(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> SourceSpec {
        SourceSpec::new(name, "ETHUSDT", Interval::from_slug("15m").unwrap())
    }

    #[test]
    fn test_build_binance() {
        let registry = SourceRegistry::new(&Settings::default());
        let source = registry.build(&spec(BINANCE_USDM_FUTURES_OHLC)).unwrap();

        assert_eq!(source.slug(), "binance_usdm_futures_ohlc/ethusdt_15m");
        assert!(source.columns().contains(&"close"));
    }

    #[test]
    fn test_build_yahoo() {
        let registry = SourceRegistry::new(&Settings::default());
        let spec = SourceSpec::new(YAHOO_FINANCE_OHLC, "SPY", Interval::days(1).unwrap());
        let source = registry.build(&spec).unwrap();

        assert_eq!(source.slug(), "yahoo_finance_ohlc/spy_1d");
        assert_eq!(source.columns(), yahoo::COLUMNS);
    }

    #[test]
    fn test_unknown_source() {
        let registry = SourceRegistry::new(&Settings::default());
        let err = registry.build(&spec("kraken_spot_ohlc")).err().unwrap();

        assert!(matches!(err, RegistryError::UnknownSource { .. }));
        assert!(err.to_string().contains(BINANCE_USDM_FUTURES_OHLC));
        assert!(err.to_string().contains(YAHOO_FINANCE_OHLC));
    }

    #[test]
    fn test_sources_share_limiter() {
        let registry = SourceRegistry::new(&Settings::default());
        let _first = registry.build(&spec(BINANCE_USDM_FUTURES_OHLC)).unwrap();
        let _second = registry.build(&spec(BINANCE_USDM_FUTURES_OHLC)).unwrap();

        let _third = registry
            .build(&SourceSpec::new(YAHOO_FINANCE_OHLC, "SPY", Interval::days(1).unwrap()))
            .unwrap();

        // registry + two sources; the Yahoo source has its own limiter
        assert_eq!(Arc::strong_count(&registry.binance_limiter), 3);
        assert_eq!(Arc::strong_count(&registry.yahoo_limiter), 2);
    }
}
