//! Range cache integration tests
//!
//! Drives `RangeCache` against scripted sources and checks what lands on
//! disk and what comes back:
//! - fetch/commit of fresh pages and reuse of cached ones
//! - probe loop termination
//! - frontier refresh and replacement of stale open segments
//! - error surfacing without leftover temp files

mod fixtures;

use fixtures::*;
use local_candles::{
    load_candles, CacheError, Interval, RangeCache, Settings, SourceSpec, StopReason, StoreError,
    Timestamp,
};
use tempfile::TempDir;

const SLUG: &str = "fake_ohlc/btcusdt_1h";

/// Hour.
const H: i64 = 3600;

/// Aligned to the 5-hour blocks served by `PagedSource`.
const T0: i64 = 1_700_010_000;

fn name(first: i64, last: i64) -> String {
    format!("{}_{}.csv", first, last)
}

fn open_name(first: i64) -> String {
    format!("{}_.csv", first)
}

fn hourly(from: i64, count: i64) -> Vec<Timestamp> {
    (0..count).map(|i| ts(from + i * H)).collect()
}

// =============================================================================
// Reference scenarios
// =============================================================================

#[test]
fn test_empty_cache_single_fetch() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();

    // 2020-01-01T12:00Z plus rows outside the query
    let source = StubSource::new(
        SLUG,
        candle_csv(&[1577880000, 1578600000, 1580396400]),
        1578600000,
        1580396400,
        true,
    );

    let start = Timestamp::parse("2020-01-01T00:00:00Z").unwrap();
    let stop = Timestamp::parse("2020-01-02T00:00:00Z").unwrap();
    let (table, report) = cache
        .load_with_report(&source, start, stop, OHLC, true)
        .unwrap();

    assert!(temp_dir
        .path()
        .join(SLUG)
        .join("1578600000_1580396400.csv")
        .is_file());
    assert_eq!(source.call_count(), 1);
    assert_eq!(report.fetched_pages, 1);
    assert_eq!(report.stop_reason, StopReason::Covered);

    assert_eq!(table.shape(), (1, 4));
    assert_eq!(table.columns(), &["open", "high", "low", "close"]);
    assert_eq!(table.index(), &[ts(1577880000)]);
}

#[test]
fn test_fetch_error_past_cached_segment() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();
    write_segment(
        temp_dir.path(),
        SLUG,
        "1576800000_1578596400.csv",
        &candle_csv(&[1577836800, 1577840400, 1578596400]),
    );
    let source = FailingSource::new(SLUG);

    let start = Timestamp::parse("2020-01-01").unwrap();
    let stop = Timestamp::parse("2020-01-15").unwrap();
    let err = cache.load(&source, start, stop, OHLC, true).unwrap_err();

    // last + (last - first) / 2
    let expected_probe = ts(1578596400 + (1578596400 - 1576800000) / 2);
    assert_eq!(expected_probe, ts(1579494600));

    match err {
        CacheError::Fetch { slug, probe, .. } => {
            assert_eq!(slug, SLUG);
            assert_eq!(probe, expected_probe);
        }
        other => panic!("expected fetch error, got {other}"),
    }
    assert_eq!(*source.calls.borrow(), vec![expected_probe]);
    assert_eq!(
        partition_files(temp_dir.path(), SLUG),
        vec!["1576800000_1578596400.csv"]
    );
}

#[test]
fn test_fetch_error_before_cached_segment() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();
    write_segment(
        temp_dir.path(),
        SLUG,
        "1578600000_1580396400.csv",
        &candle_csv(&[1578600000, 1580396400]),
    );
    let source = FailingSource::new(SLUG);

    let start = Timestamp::parse("2020-01-01").unwrap();
    let stop = Timestamp::parse("2020-01-15").unwrap();
    let err = cache.load(&source, start, stop, OHLC, true).unwrap_err();

    assert!(matches!(err, CacheError::Fetch { probe, .. } if probe == start));
    assert!(err.to_string().contains("connection refused"));
    assert_eq!(
        partition_files(temp_dir.path(), SLUG),
        vec!["1578600000_1580396400.csv"]
    );
}

// =============================================================================
// Reuse and idempotence
// =============================================================================

#[test]
fn test_second_load_is_served_from_cache() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();
    let source = PagedSource::new(SLUG, T0 + 1000 * H);

    let (first, report) = cache
        .load_with_report(&source, ts(T0), ts(T0 + 24 * H), OHLCV, true)
        .unwrap();
    assert_eq!(report.fetched_pages, 5);
    assert_eq!(report.stop_reason, StopReason::Covered);
    assert_eq!(first.index(), hourly(T0, 24).as_slice());

    source.reset_calls();
    let (second, report) = cache
        .load_with_report(&source, ts(T0), ts(T0 + 24 * H), OHLCV, true)
        .unwrap();

    assert_eq!(source.call_count(), 0);
    assert_eq!(report.fetched_pages, 0);
    assert_eq!(report.segments.len(), 5);
    assert_eq!(first, second);
}

#[test]
fn test_cached_range_needs_no_source() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();

    let paged = PagedSource::new(SLUG, T0 + 1000 * H);
    cache
        .load(&paged, ts(T0), ts(T0 + 24 * H), OHLCV, true)
        .unwrap();

    let failing = FailingSource::new(SLUG);
    let table = cache
        .load(&failing, ts(T0), ts(T0 + 24 * H), OHLCV, true)
        .unwrap();

    assert!(failing.calls.borrow().is_empty());
    assert_eq!(table.len(), 24);
    assert_eq!(table.column("volume"), Some(vec![10.0; 24]));
}

#[test]
fn test_rows_stay_in_range() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();
    let source = PagedSource::new(SLUG, T0 + 1000 * H);

    let start = ts(T0 + 2 * H + 1);
    let stop = ts(T0 + 13 * H);
    let table = cache.load(&source, start, stop, OHLC, true).unwrap();

    assert_eq!(table.index(), hourly(T0 + 3 * H, 10).as_slice());
    assert!(table.index().iter().all(|t| *t >= start && *t < stop));
}

// =============================================================================
// Termination
// =============================================================================

#[test]
fn test_repeated_page_stops_probing() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();
    let source = StubSource::new(SLUG, candle_csv(&[T0 + 100, T0 + 200]), T0 + 100, T0 + 200, true);

    let (table, report) = cache
        .load_with_report(&source, ts(T0), ts(T0 + 100_000), OHLC, true)
        .unwrap();

    assert_eq!(source.call_count(), 2);
    assert_eq!(report.stop_reason, StopReason::NoProgress);
    assert_eq!(report.segments.len(), 1);
    assert_eq!(table.len(), 2);
    assert_eq!(
        partition_files(temp_dir.path(), SLUG),
        vec![name(T0 + 100, T0 + 200)]
    );
}

#[test]
fn test_short_page_stops_probing() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();
    let source = PagedSource::new(SLUG, T0 + 7 * H);

    let (table, report) = cache
        .load_with_report(&source, ts(T0), ts(T0 + 24 * H), OHLC, true)
        .unwrap();

    assert_eq!(source.call_count(), 2);
    assert_eq!(report.stop_reason, StopReason::ShortPage);
    assert_eq!(table.index(), hourly(T0, 8).as_slice());
    assert_eq!(
        partition_files(temp_dir.path(), SLUG),
        vec![name(T0, T0 + 4 * H), open_name(T0 + 5 * H)]
    );
}

#[test]
fn test_segment_spanning_most_of_i64_stops_probing() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();
    write_segment(
        temp_dir.path(),
        SLUG,
        "-9223372036854775808_9000000000000000000.csv",
        &candle_csv(&[0, H]),
    );
    let source = FailingSource::new(SLUG);

    let (table, report) = cache
        .load_with_report(&source, ts(0), ts(i64::MAX), OHLC, true)
        .unwrap();

    assert!(source.calls.borrow().is_empty());
    assert_eq!(report.stop_reason, StopReason::NoProgress);
    assert_eq!(report.segments.len(), 1);
    assert_eq!(table.index(), &[ts(0), ts(H)]);
}

// =============================================================================
// Frontier handling
// =============================================================================

#[test]
fn test_open_segment_served_without_reload() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();
    let source = PagedSource::new(SLUG, T0 + 7 * H);
    cache
        .load(&source, ts(T0), ts(T0 + 24 * H), OHLC, true)
        .unwrap();

    source.advance_to(T0 + 8 * H);
    source.reset_calls();

    let (table, report) = cache
        .load_with_report(&source, ts(T0), ts(T0 + 24 * H), OHLC, false)
        .unwrap();

    assert_eq!(source.call_count(), 0);
    assert_eq!(report.stop_reason, StopReason::OpenSegment);
    assert_eq!(table.len(), 8);
}

#[test]
fn test_reload_latest_refetches_frontier() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();
    let source = PagedSource::new(SLUG, T0 + 7 * H);
    cache
        .load(&source, ts(T0), ts(T0 + 24 * H), OHLC, true)
        .unwrap();

    source.advance_to(T0 + 8 * H);
    source.reset_calls();

    let table = cache
        .load(&source, ts(T0), ts(T0 + 24 * H), OHLC, true)
        .unwrap();

    assert_eq!(source.call_count(), 1);
    assert_eq!(table.index(), hourly(T0, 9).as_slice());
    assert_eq!(
        partition_files(temp_dir.path(), SLUG),
        vec![name(T0, T0 + 4 * H), open_name(T0 + 5 * H)]
    );
}

#[test]
fn test_completed_page_replaces_open_segment() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();
    let source = PagedSource::new(SLUG, T0 + 7 * H);
    cache
        .load(&source, ts(T0), ts(T0 + 24 * H), OHLC, true)
        .unwrap();

    source.advance_to(T0 + 11 * H);
    source.reset_calls();

    let table = cache
        .load(&source, ts(T0), ts(T0 + 24 * H), OHLC, true)
        .unwrap();

    assert_eq!(source.call_count(), 2);
    assert_eq!(table.index(), hourly(T0, 12).as_slice());
    assert_eq!(
        partition_files(temp_dir.path(), SLUG),
        vec![
            name(T0, T0 + 4 * H),
            name(T0 + 5 * H, T0 + 9 * H),
            open_name(T0 + 10 * H),
        ]
    );
}

// =============================================================================
// Overlapping segments
// =============================================================================

#[test]
fn test_overlapping_segments_yield_unique_rows() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();
    write_segment(
        temp_dir.path(),
        SLUG,
        &name(T0, T0 + 4 * H),
        &candle_csv(&hourly(T0, 5).iter().map(|t| t.as_secs()).collect::<Vec<_>>()),
    );
    write_segment(
        temp_dir.path(),
        SLUG,
        &name(T0 + 2 * H, T0 + 6 * H),
        &candle_csv(&hourly(T0 + 2 * H, 5).iter().map(|t| t.as_secs()).collect::<Vec<_>>()),
    );
    let source = FailingSource::new(SLUG);

    let table = cache
        .load(&source, ts(T0), ts(T0 + 6 * H), OHLC, true)
        .unwrap();

    let mut index = table.index().to_vec();
    index.sort();
    index.dedup();
    assert_eq!(index.len(), table.len());
    assert_eq!(index, hourly(T0, 6));
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_failed_fetch_removes_partial_page() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();
    let source = FailingSource::new(SLUG).with_partial_write();

    let err = cache
        .load(&source, ts(T0), ts(T0 + 24 * H), OHLC, true)
        .unwrap_err();

    assert!(matches!(err, CacheError::Fetch { .. }));
    assert!(partition_files(temp_dir.path(), SLUG).is_empty());
}

#[test]
fn test_missing_page_file_fails_commit() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();
    let source = SilentSource {
        slug: SLUG.to_string(),
    };

    let err = cache
        .load(&source, ts(T0), ts(T0 + 24 * H), OHLC, true)
        .unwrap_err();

    assert!(matches!(err, CacheError::Store(StoreError::Commit { .. })));
    let message = err.to_string();
    assert!(message.contains(&format!("{}.csv", T0)));
    assert!(message.contains(&name(T0, T0 + H)));
    assert!(partition_files(temp_dir.path(), SLUG).is_empty());
}

#[test]
fn test_missing_column_surfaces() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();
    let source = PagedSource::new(SLUG, T0 + 1000 * H);

    let err = cache
        .load(&source, ts(T0), ts(T0 + 4 * H), &["open", "vwap"], true)
        .unwrap_err();

    match err {
        CacheError::MissingColumn { column, path } => {
            assert_eq!(column, "vwap");
            assert!(path.ends_with(name(T0, T0 + 4 * H)));
        }
        other => panic!("expected missing column, got {other}"),
    }
}

#[test]
fn test_ts_column_is_index() {
    let temp_dir = TempDir::new().unwrap();
    let cache = RangeCache::new(temp_dir.path()).unwrap();
    let source = PagedSource::new(SLUG, T0 + 1000 * H);

    let table = cache
        .load(&source, ts(T0), ts(T0 + 4 * H), &["ts", "close"], true)
        .unwrap();

    assert_eq!(table.columns(), &["close"]);
    assert_eq!(table.len(), 4);
}

#[test]
fn test_load_candles_unknown_source() {
    let temp_dir = TempDir::new().unwrap();
    let settings = Settings {
        cache_root: temp_dir.path().join("cache"),
        ..Settings::default()
    };
    let spec = SourceSpec::new("nope_ohlc", "BTCUSDT", Interval::hours(1).unwrap());

    let err = load_candles(&settings, &spec, ts(T0), ts(T0 + H), None).unwrap_err();
    assert!(matches!(err, CacheError::Registry(_)));
    assert!(err.to_string().contains("nope_ohlc"));
}
