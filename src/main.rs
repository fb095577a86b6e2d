//! local-candles CLI
//!
//! Entry point for the `local-candles` command-line tool.

use clap::{Parser, Subcommand, ValueEnum};
use local_candles::config::CONFIG_ENV;
use local_candles::sources::{BINANCE_USDM_FUTURES_OHLC, SOURCE_NAMES};
use local_candles::{
    load_candles, logging, Interval, RangeCache, Segment, SegmentStore, Settings, SourceSpec,
    Timestamp,
};
use serde_json::json;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "local-candles")]
#[command(about = "Local incremental cache for OHLC candle sources", version)]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, short = 'c', global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a time range, fetching missing pages, and print it
    Load {
        /// Registered source name
        #[arg(long, default_value = BINANCE_USDM_FUTURES_OHLC)]
        source: String,

        /// Market symbol, e.g. BTCUSDT or SPY
        #[arg(long)]
        symbol: String,

        /// Candle interval, e.g. 1m, 15m, 1h, 1d
        #[arg(long)]
        interval: Interval,

        /// Inclusive start (epoch seconds, RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        start: Timestamp,

        /// Exclusive stop (epoch seconds, RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        stop: Timestamp,

        /// Columns to return (comma-separated, default from settings)
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,

        /// Trust cached open segments instead of refetching the frontier
        #[arg(long)]
        no_reload_latest: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Csv)]
        format: Format,

        /// Cache root directory
        #[arg(long)]
        cache_root: Option<PathBuf>,
    },

    /// List cached segments
    Segments {
        /// Only this partition, e.g. binance_usdm_futures_ohlc/btcusdt_1h
        #[arg(long)]
        slug: Option<String>,

        /// Cache root directory
        #[arg(long)]
        cache_root: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List registered source names
    Sources,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Json,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Commands::Load {
            source,
            symbol,
            interval,
            start,
            stop,
            columns,
            no_reload_latest,
            format,
            cache_root,
        } => {
            let settings = load_settings(cli.config.as_deref(), cache_root, no_reload_latest);
            let spec = SourceSpec::new(source, symbol, interval);
            run_load(&settings, &spec, start, stop, columns, format);
        }
        Commands::Segments {
            slug,
            cache_root,
            json,
        } => {
            let settings = load_settings(cli.config.as_deref(), cache_root, false);
            run_segments(&settings, slug.as_deref(), json);
        }
        Commands::Sources => {
            for name in SOURCE_NAMES {
                println!("{}", name);
            }
        }
    }
}

fn load_settings(config: Option<&Path>, cache_root: Option<PathBuf>, no_reload_latest: bool) -> Settings {
    let reload_latest = no_reload_latest.then_some(false);
    let overrides = json!({
        "cache_root": cache_root,
        "reload_latest": reload_latest,
    });

    match Settings::build(config, Some(overrides)) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error loading settings: {}", e);
            process::exit(1);
        }
    }
}

fn run_load(
    settings: &Settings,
    spec: &SourceSpec,
    start: Timestamp,
    stop: Timestamp,
    columns: Option<Vec<String>>,
    format: Format,
) {
    if start >= stop {
        eprintln!("Error: --start ({}) must be before --stop ({})", start, stop);
        process::exit(1);
    }

    let column_refs: Option<Vec<&str>> = columns
        .as_ref()
        .map(|cols| cols.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect());

    let table = match load_candles(settings, spec, start, stop, column_refs.as_deref()) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let stdout = io::stdout();
    let result = match format {
        Format::Csv => table.write_csv(stdout.lock()).map_err(|e| e.to_string()),
        Format::Json => serde_json::to_string_pretty(&table)
            .map_err(|e| e.to_string())
            .and_then(|out| writeln!(stdout.lock(), "{}", out).map_err(|e| e.to_string())),
    };

    if let Err(e) = result {
        eprintln!("Error writing output: {}", e);
        process::exit(1);
    }
}

fn run_segments(settings: &Settings, slug: Option<&str>, json_output: bool) {
    let cache = match RangeCache::new(&settings.cache_root) {
        Ok(cache) => cache,
        Err(e) => {
            eprintln!("Error opening cache: {}", e);
            process::exit(1);
        }
    };

    let slugs = match slug {
        Some(slug) => vec![slug.to_string()],
        None => match SegmentStore::partitions(cache.root()) {
            Ok(slugs) => slugs,
            Err(e) => {
                eprintln!("Error scanning cache: {}", e);
                process::exit(1);
            }
        },
    };

    let mut listing: Vec<(String, Vec<Segment>)> = Vec::new();
    for slug in slugs {
        let segments = match cache.store(&slug).and_then(|store| store.list().map_err(Into::into)) {
            Ok(segments) => segments,
            Err(e) => {
                eprintln!("Error listing {}: {}", slug, e);
                process::exit(1);
            }
        };
        listing.push((slug, segments));
    }

    if json_output {
        let output: Vec<serde_json::Value> = listing
            .iter()
            .flat_map(|(slug, segments)| {
                segments.iter().map(move |s| {
                    json!({
                        "slug": slug,
                        "first": s.first().as_secs(),
                        "last": s.last().map(Timestamp::as_secs),
                        "open": s.is_open(),
                        "path": s.path.display().to_string(),
                    })
                })
            })
            .collect();

        match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
        return;
    }

    if listing.iter().all(|(_, segments)| segments.is_empty()) {
        println!("No cached segments under {}", cache.root().display());
        return;
    }

    for (slug, segments) in &listing {
        println!("{} ({} segments)", slug, segments.len());
        for segment in segments {
            let last = match segment.last() {
                Some(last) => last.to_string(),
                None => "open".to_string(),
            };
            println!("  {}  {}  {}", segment.first(), last, segment.path.display());
        }
    }
}
