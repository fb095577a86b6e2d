//! Blocking outbound rate limiter.
//!
//! One limiter is shared by every source instance of the same type, so all
//! requests to one vendor are spaced out regardless of symbol or interval.

use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

/// Enforces a minimum spacing between calls.
#[derive(Debug)]
pub struct RateLimiter {
    min_spacing: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Allow at most `calls_per_second` calls. Non-positive or non-finite
    /// rates disable limiting.
    pub fn new(calls_per_second: f64) -> Self {
        let min_spacing = if calls_per_second.is_finite() && calls_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / calls_per_second)
        } else {
            Duration::ZERO
        };

        Self {
            min_spacing,
            last_call: Mutex::new(None),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0.0)
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Block until a call is allowed, then record it.
    pub fn acquire(&self) {
        let mut last_call = self
            .last_call
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.min_spacing {
                let wait = self.min_spacing - elapsed;
                trace!(wait_ms = wait.as_millis() as u64, "rate limited");
                thread::sleep(wait);
            }
        }

        *last_call = Some(Instant::now());
    }
}
