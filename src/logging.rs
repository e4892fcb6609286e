//! Logging initialization.

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins over `level` when set. Returns `false` if a subscriber was
/// already installed, which is expected when tests call this repeatedly.
///
/// ```ignore
/// search_sync::logging::init_logging(&config.log_level, config.log_json);
/// tracing::info!("search sync started");
/// ```
pub fn init_logging(level: &str, json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}
