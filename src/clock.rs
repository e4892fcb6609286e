//! Timestamp helpers shared by the stores.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};

/// Hands out strictly increasing timestamps with microsecond precision.
///
/// Microseconds survive an RFC 3339 round-trip exactly, so a watermark sent
/// in a delta query compares equal to the stored value.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: Mutex<Option<DateTime<Utc>>>,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let now = truncate_micros(Utc::now());
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let next = match *last {
            Some(previous) if now <= previous => previous + TimeDelta::microseconds(1),
            _ => now,
        };
        *last = Some(next);
        next
    }
}

pub fn truncate_micros(at: DateTime<Utc>) -> DateTime<Utc> {
    at.duration_trunc(TimeDelta::microseconds(1)).unwrap_or(at)
}

/// `at + duration`, saturating at the maximum representable time.
pub fn add_duration(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(duration)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
