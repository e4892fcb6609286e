//! Sync pipeline integration tests.

mod support;
mod concurrency;
mod relay;
mod scenarios;
