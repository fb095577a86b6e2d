//! Yahoo Finance chart bars.
//!
//! `GET /v8/finance/chart/<symbol>` returns the bars between `period1` and
//! `period2` (epoch seconds) as parallel arrays. A page is the window of
//! `limit` intervals anchored the same way as exchange kline pages, so
//! every timestamp inside one window maps to the same request.
//!
//! Markets close on weekends and holidays, so a window rarely holds `limit`
//! bars. A page counts as completed once its window has fully elapsed.

use std::path::Path;
use std::sync::Arc;

use candles_core::{Interval, PageBounds, Source, SourceError, Timestamp};
use serde::Deserialize;
use tracing::debug;

use super::rate_limit::RateLimiter;
use super::transport::KlineTransport;

/// Registry name and slug prefix.
pub const YAHOO_FINANCE_OHLC: &str = "yahoo_finance_ohlc";

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// Intervals per request window.
pub const DEFAULT_PAGE_LIMIT: i64 = 500;

pub const MAX_PAGE_LIMIT: i64 = 5000;

const CHART_PATH: &str = "/v8/finance/chart";

/// Columns written after `ts`.
pub const COLUMNS: &[&str] = &["open", "high", "low", "close", "volume"];

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
}

/// Parallel value arrays; `null` marks a bar with no trades.
#[derive(Debug, Default, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bar {
    ts: Timestamp,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl Bar {
    fn record(&self) -> [String; 6] {
        [
            self.ts.as_secs().to_string(),
            self.open.to_string(),
            self.high.to_string(),
            self.low.to_string(),
            self.close.to_string(),
            self.volume.to_string(),
        ]
    }
}

impl ChartResult {
    /// Bars inside `[start, end)` with all four prices present.
    fn bars(&self, start: Timestamp, end: Timestamp) -> Vec<Bar> {
        let empty = Quote::default();
        let quote = self.indicators.quote.first().unwrap_or(&empty);
        let at = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();

        self.timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, secs)| {
                let ts = Timestamp::from_secs(*secs);
                if ts < start || ts >= end {
                    return None;
                }
                Some(Bar {
                    ts,
                    open: at(&quote.open, i)?,
                    high: at(&quote.high, i)?,
                    low: at(&quote.low, i)?,
                    close: at(&quote.close, i)?,
                    volume: at(&quote.volume, i).unwrap_or(0.0),
                })
            })
            .collect()
    }
}

/// Interval name understood by the chart endpoint.
fn chart_interval(interval: Interval) -> String {
    match interval.slug().as_str() {
        "1w" => "1wk".to_string(),
        slug => slug.to_string(),
    }
}

/// Paginated chart source for one symbol and interval.
pub struct YahooFinanceOhlcSource {
    symbol: String,
    interval: Interval,
    limit: i64,
    base_url: String,
    transport: Box<dyn KlineTransport>,
    limiter: Arc<RateLimiter>,
    clock: fn() -> Timestamp,
}

impl YahooFinanceOhlcSource {
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
            clock: Timestamp::now,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Intervals per window, clamped to `1..=MAX_PAGE_LIMIT`.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit.clamp(1, MAX_PAGE_LIMIT);
        self
    }

    /// Replace the wall clock used to decide whether a window has elapsed.
    pub fn with_clock(mut self, clock: fn() -> Timestamp) -> Self {
        self.clock = clock;
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

    /// Window `[start, end)` requested for `at`.
    pub fn window(&self, at: Timestamp) -> Option<(Timestamp, Timestamp)> {
        let start = self.interval.align(at, self.limit);
        let end = start.checked_add(self.interval.as_secs().checked_mul(self.limit)?)?;
        Some((start, end))
    }

    fn write_page(&self, dest: &Path, bars: &[Bar]) -> Result<(), SourceError> {
        let write_err = |e: csv::Error| SourceError::Write(e.to_string());
        let mut writer = csv::Writer::from_path(dest).map_err(write_err)?;

        let mut header = vec![candles_core::TS_COLUMN];
        header.extend_from_slice(COLUMNS);
        writer.write_record(&header).map_err(write_err)?;

        for bar in bars {
            writer.write_record(bar.record()).map_err(write_err)?;
        }

        writer.flush()?;
        Ok(())
    }
}

impl Source for YahooFinanceOhlcSource {
    fn slug(&self) -> String {
        format!(
            "{}/{}_{}",
            YAHOO_FINANCE_OHLC,
            self.symbol.to_lowercase(),
            self.interval.slug()
        )
    }

    fn columns(&self) -> &[&str] {
        COLUMNS
    }

    fn fetch_page(&self, at: Timestamp, dest: &Path) -> Result<PageBounds, SourceError> {
        let (start, end) = self
            .window(at)
            .ok_or_else(|| SourceError::Other(format!("no chart window for {}", at.as_secs())))?;
        let url = format!(
            "{}{}/{}",
            self.base_url.trim_end_matches('/'),
            CHART_PATH,
            self.symbol
        );
        let query = [
            ("period1", start.as_secs().to_string()),
            ("period2", end.as_secs().to_string()),
            ("interval", chart_interval(self.interval)),
            ("includePrePost", "false".to_string()),
        ];

        self.limiter.acquire();
        let body = self.transport.get_json(&url, &query)?;

        let response: ChartResponse =
            serde_json::from_value(body).map_err(|e| SourceError::Decode(e.to_string()))?;
        if let Some(error) = response.chart.error {
            return Err(SourceError::Request(format!(
                "{}: {}",
                error.code, error.description
            )));
        }

        let bars = response
            .chart
            .result
            .unwrap_or_default()
            .first()
            .map(|result| result.bars(start, end))
            .unwrap_or_default();

        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Err(SourceError::EmptyPage { probe: at });
        };
        let bounds = PageBounds::new(first.ts, last.ts, end <= (self.clock)());

        self.write_page(dest, &bars)?;
        debug!(
            symbol = %self.symbol,
            start = start.as_secs(),
            rows = bars.len(),
            completed = bounds.completed,
            "fetched chart bars"
        );

        Ok(bounds)
    }
}
