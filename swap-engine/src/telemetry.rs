//! Logging setup for the swap engine

use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Configure logging for the process
///
/// Defaults to `INFO` and may be overridden per-target through the
/// standard `RUST_LOG` environment variable.
pub fn setup_logging() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy(),
        )
        .with(fmt::layer().with_file(true).with_line_number(true).json().flatten_event(true))
        .init();
}
