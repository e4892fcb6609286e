//! Capped exponential backoff.
//!
//! ```text
//! attempt    delay (base=10s, max=300s)
//! ───────────────────────────────────────
//!    1         10s
//!    2         20s
//!    3         40s
//!    4         80s
//!    5        160s
//!   >5        300s (capped)
//! ```
//!
//! Jitter spreads the delay by ±`jitter_factor` without exceeding the cap.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_DELAY_SECS: f64 = 10.0;
const DEFAULT_MAX_DELAY_SECS: f64 = 300.0;
const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Upper bound for any configured number of seconds (one year).
pub const MAX_SECONDS: f64 = 365.0 * 24.0 * 60.0 * 60.0;

/// Configured seconds as a `Duration`, clamped to `0..=MAX_SECONDS`.
/// NaN counts as zero.
pub fn seconds(value: f64) -> Duration {
    if value.is_nan() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(value.clamp(0.0, MAX_SECONDS))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    #[serde(default = "default_base_delay")]
    pub base_delay_seconds: f64,

    #[serde(default = "default_max_delay")]
    pub max_delay_seconds: f64,

    /// 0.0-1.0
    #[serde(default = "default_jitter")]
    pub jitter_factor: f64,
}

fn default_base_delay() -> f64 {
    DEFAULT_BASE_DELAY_SECS
}

fn default_max_delay() -> f64 {
    DEFAULT_MAX_DELAY_SECS
}

fn default_jitter() -> f64 {
    DEFAULT_JITTER_FACTOR
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_seconds: DEFAULT_BASE_DELAY_SECS,
            max_delay_seconds: DEFAULT_MAX_DELAY_SECS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl fmt::Display for BackoffConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BackoffConfig(base_delay={}s, max_delay={}s, jitter={:.1}%)",
            self.base_delay_seconds,
            self.max_delay_seconds,
            self.jitter_factor * 100.0
        )
    }
}

impl BackoffConfig {
    /// Backoff without jitter, for deterministic schedules.
    pub fn without_jitter(base: Duration, max: Duration) -> Self {
        Self {
            base_delay_seconds: base.as_secs_f64(),
            max_delay_seconds: max.as_secs_f64(),
            jitter_factor: 0.0,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay_seconds.max(0.0);
        let max = self.max_delay_seconds.max(base);
        let exponent = attempt.saturating_sub(1).min(62) as i32;
        let mut secs = (base * 2f64.powi(exponent)).min(max);

        let jitter = self.jitter_factor.clamp(0.0, 1.0);
        if jitter > 0.0 && secs > 0.0 {
            let spread = secs * jitter;
            secs += rand::thread_rng().gen_range(-spread..=spread);
        }

        seconds(secs.min(max))
    }
}
