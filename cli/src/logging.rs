//! Tracing initialization: console output filtered by `RUST_LOG`, plus an
//! optional daily-rotated file appender when `LOG_DIR` is set.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Returned guard must be held for the lifetime of the process so buffered
/// file logs are flushed on exit.
pub fn init() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,sqlx=warn"));

    let console_layer = tracing_subscriber::fmt::layer().with_target(false);

    if let Ok(dir) = std::env::var("LOG_DIR") {
        let appender = tracing_appender::rolling::daily(&dir, "maestro.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false);
        tracing_subscriber::registry()
            .with(console_layer.and_then(file_layer).with_filter(filter))
            .init();
        tracing::info!(dir, "logging to file");
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(console_layer.with_filter(filter))
            .init();
        None
    }
}
