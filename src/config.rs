//! Configuration for the sync pipeline.
//!
//! Every field has a default, so an empty JSON object is a valid file.
//! Environment variables override a few deployment-specific values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backoff::MAX_SECONDS;
use crate::consumer::ConsumerConfig;
use crate::outbox::RelayConfig;
use crate::reconcile::ReconcileConfig;

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_AUCTION_URL: &str = "http://localhost:7001";

pub const ENV_AUCTION_URL: &str = "SEARCH_SYNC_AUCTION_URL";
pub const ENV_LOG_LEVEL: &str = "SEARCH_SYNC_LOG_LEVEL";
pub const ENV_POLL_INTERVAL: &str = "SEARCH_SYNC_POLL_INTERVAL_SECONDS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("{key} must be between 0 seconds and one year, got {value}")]
    OutOfRange { key: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// trace, debug, info, warn or error
    pub log_level: String,
    /// Emit logs as JSON lines instead of human readable text
    pub log_json: bool,
    /// Base URL of the authoritative auction service
    pub auction_service_url: String,
    pub relay: RelayConfig,
    pub consumer: ConsumerConfig,
    pub reconcile: ReconcileConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            auction_service_url: DEFAULT_AUCTION_URL.to_string(),
            relay: RelayConfig::default(),
            consumer: ConsumerConfig::default(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Defaults, then environment overrides.
    pub fn new() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.load_from_env()?;
        Ok(config)
    }

    /// Read a JSON file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.load_from_env()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject durations that are negative, not finite or beyond a year.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let relay = &self.relay;
        let consumer = &self.consumer;
        let reconcile = &self.reconcile;
        let mut durations = vec![
            ("relay.pollIntervalSeconds", relay.poll_interval_seconds),
            ("relay.leaseSeconds", relay.lease_seconds),
            ("relay.retentionSeconds", relay.retention_seconds),
            ("relay.backoff.baseDelaySeconds", relay.backoff.base_delay_seconds),
            ("relay.backoff.maxDelaySeconds", relay.backoff.max_delay_seconds),
            ("consumer.retry.intervalSeconds", consumer.retry.interval_seconds),
            ("consumer.pollTimeoutSeconds", consumer.poll_timeout_seconds),
            ("reconcile.intervalSeconds", reconcile.interval_seconds),
            ("reconcile.maxDelaySeconds", reconcile.max_delay_seconds),
            ("reconcile.breakerCooldownSeconds", reconcile.breaker_cooldown_seconds),
        ];
        if let Some(max_wait) = reconcile.max_wait_seconds {
            durations.push(("reconcile.maxWaitSeconds", max_wait));
        }

        for (key, value) in durations {
            if !in_range(value) {
                return Err(ConfigError::OutOfRange { key, value });
            }
        }
        Ok(())
    }

    pub fn load_from_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_AUCTION_URL) {
            self.auction_service_url = url;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(value) = lookup(ENV_POLL_INTERVAL) {
            self.relay.poll_interval_seconds = value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|seconds| in_range(*seconds))
                .ok_or(ConfigError::InvalidEnv {
                    key: ENV_POLL_INTERVAL,
                    value,
                })?;
        }
        Ok(())
    }
}

fn in_range(seconds: f64) -> bool {
    seconds.is_finite() && (0.0..=MAX_SECONDS).contains(&seconds)
}
