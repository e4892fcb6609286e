use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    /// Calls are rejected until the cooldown has elapsed.
    Open,
    /// Cooldown elapsed; the next call decides.
    HalfOpen,
}

#[derive(Debug, Default)]
struct Inner {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Consecutive-failure circuit breaker around the authoritative source.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn state(&self) -> BreakerState {
        let Ok(inner) = self.inner.lock() else {
            return BreakerState::Closed;
        };
        match inner.opened_at {
            None => BreakerState::Closed,
            Some(at) if at.elapsed() >= self.cooldown => BreakerState::HalfOpen,
            Some(_) => BreakerState::Open,
        }
    }

    /// Time left before a call may go through; zero when it may go now.
    pub fn remaining_cooldown(&self) -> Duration {
        let Ok(inner) = self.inner.lock() else {
            return Duration::ZERO;
        };
        inner
            .opened_at
            .map(|at| self.cooldown.saturating_sub(at.elapsed()))
            .unwrap_or(Duration::ZERO)
    }

    pub fn record_success(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            *inner = Inner::default();
        }
    }

    /// Count a failure. Returns `true` if this failure opened the circuit.
    pub fn record_failure(&self) -> bool {
        let Ok(mut inner) = self.inner.lock() else {
            return false;
        };
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let half_open = inner
            .opened_at
            .is_some_and(|at| at.elapsed() >= self.cooldown);
        if half_open || (inner.opened_at.is_none() && inner.consecutive_failures >= self.threshold) {
            inner.opened_at = Some(Instant::now());
            return true;
        }
        false
    }
}
