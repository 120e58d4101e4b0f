//! Observability
//!
//! Structured logging through `tracing`. Severe conditions that should page
//! someone are `error!` events carrying `alert = true`.

mod config;

pub use config::LoggingConfig;

use tracing_subscriber::EnvFilter;

/// Build the event filter: `RUST_LOG` first, then the configured level,
/// then `info` if the configured level does not parse.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_tracing(config: &LoggingConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(std::io::stderr)
        .with_target(false);

    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
