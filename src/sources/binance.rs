//! Binance USD-M futures klines.
//!
//! `GET /fapi/v1/klines` returns up to `limit` candles starting at
//! `startTime`. Each page is anchored at a block of `limit` intervals
//! containing the probe, so every probe inside one block maps to the same
//! request.

use std::path::Path;
use std::sync::Arc;

use candles_core::{Interval, PageBounds, Source, SourceError, Timestamp};
use serde::de::IgnoredAny;
use serde::Deserialize;
use tracing::debug;

use super::rate_limit::RateLimiter;
use super::transport::KlineTransport;

/// Registry name and slug prefix.
pub const BINANCE_USDM_FUTURES_OHLC: &str = "binance_usdm_futures_ohlc";

pub const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";

/// Candles per request.
pub const DEFAULT_PAGE_LIMIT: i64 = 500;

/// Largest `limit` the endpoint accepts.
pub const MAX_PAGE_LIMIT: i64 = 1500;

const KLINES_PATH: &str = "/fapi/v1/klines";

/// Columns written after `ts`.
pub const COLUMNS: &[&str] = &[
    "open",
    "high",
    "low",
    "close",
    "volume",
    "close_time",
    "quote_volume",
    "trades_number",
    "taker_buy_base_volume",
    "taker_buy_quote_volume",
];

/// One kline as returned by the REST API.
///
/// Prices and volumes arrive as decimal strings and are written through
/// unchanged; times are epoch milliseconds.
#[derive(Debug, Deserialize)]
struct RestKline(
    i64,        // open time
    String,     // open
    String,     // high
    String,     // low
    String,     // close
    String,     // volume
    i64,        // close time
    String,     // quote asset volume
    u64,        // number of trades
    String,     // taker buy base asset volume
    String,     // taker buy quote asset volume
    IgnoredAny, // unused
);

impl RestKline {
    fn open_ts(&self) -> Timestamp {
        Timestamp::from_secs(self.0.div_euclid(1000))
    }

    fn record(&self) -> [String; 11] {
        [
            self.open_ts().as_secs().to_string(),
            self.1.clone(),
            self.2.clone(),
            self.3.clone(),
            self.4.clone(),
            self.5.clone(),
            self.6.to_string(),
            self.7.clone(),
            self.8.to_string(),
            self.9.clone(),
            self.10.clone(),
        ]
    }
}

/// Paginated kline source for one symbol and interval.
pub struct BinanceUsdmFuturesSource {
    symbol: String,
    interval: Interval,
    limit: i64,
    base_url: String,
    transport: Box<dyn KlineTransport>,
    limiter: Arc<RateLimiter>,
}

impl BinanceUsdmFuturesSource {
    pub fn new(
        symbol: impl Into<String>,
        interval: Interval,
        transport: Box<dyn KlineTransport>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            limit: DEFAULT_PAGE_LIMIT,
            base_url: DEFAULT_BASE_URL.to_string(),
            transport,
            limiter,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Candles per page, clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn interval(&self) -> Interval {
        self.interval
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    /// Start of the page requested for `probe`.
    pub fn page_start(&self, probe: Timestamp) -> Timestamp {
        self.interval.align(probe, self.limit)
    }

    fn write_page(&self, dest: &Path, klines: &[RestKline]) -> Result<(), SourceError> {
        let write_err = |e: csv::Error| SourceError::Write(e.to_string());

        let mut writer = csv::Writer::from_path(dest).map_err(write_err)?;

        let mut header = vec![candles_core::TS_COLUMN];
        header.extend_from_slice(COLUMNS);
        writer.write_record(&header).map_err(write_err)?;

        for kline in klines {
            writer.write_record(kline.record()).map_err(write_err)?;
        }

        writer.flush()?;
        Ok(())
    }
}

impl Source for BinanceUsdmFuturesSource {
    fn slug(&self) -> String {
        format!(
            "{}/{}_{}",
            BINANCE_USDM_FUTURES_OHLC,
            self.symbol.to_lowercase(),
            self.interval.slug()
        )
    }

    fn columns(&self) -> &[&str] {
        COLUMNS
    }

    fn fetch_page(&self, probe: Timestamp, dest: &Path) -> Result<PageBounds, SourceError> {
        let start = self.page_start(probe);
        let start_ms = start.as_secs().checked_mul(1000).ok_or_else(|| {
            SourceError::Other(format!(
                "start time {} out of range in milliseconds",
                start.as_secs()
            ))
        })?;
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), KLINES_PATH);
        let query = [
            ("symbol", self.symbol.clone()),
            ("interval", self.interval.slug()),
            ("limit", self.limit.to_string()),
            ("startTime", start_ms.to_string()),
        ];

        self.limiter.acquire();
        let body = self.transport.get_json(&url, &query)?;

        let klines: Vec<RestKline> =
            serde_json::from_value(body).map_err(|e| SourceError::Decode(e.to_string()))?;

        let (Some(first), Some(last)) = (klines.first(), klines.last()) else {
            return Err(SourceError::EmptyPage { probe });
        };
        let bounds = PageBounds::new(
            first.open_ts(),
            last.open_ts(),
            klines.len() as i64 == self.limit,
        );

        self.write_page(dest, &klines)?;
        debug!(
            symbol = %self.symbol,
            start = start.as_secs(),
            rows = klines.len(),
            "fetched klines"
        );

        Ok(bounds)
    }
}
