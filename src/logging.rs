//! Tracing subscriber setup for the binary.

use tracing_subscriber::EnvFilter;

/// Crates whose level follows `--verbose`.
const CRATES: &[&str] = &["local_candles", "candles_core", "candles_store"];

/// Filter directive for a `-v` count: warn, info, debug, then trace.
pub fn directive(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    CRATES
        .iter()
        .map(|c| format!("{}={}", c, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install a stderr subscriber. `RUST_LOG` wins over `verbosity` when set.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
