//! Logging Module
//!
//! Structured logging with file output for diagnostics.

use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging with file output in `log_dir` and, in debug builds,
/// console output on stderr
pub fn init(log_dir: &Path) {
    // Ensure log directory exists
    let _ = std::fs::create_dir_all(log_dir);

    // Daily rotation
    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "bloxpiece-hub.log");

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(file_appender);

    #[cfg(debug_assertions)]
    let console_layer = Some(
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact(),
    );

    #[cfg(not(debug_assertions))]
    let console_layer: Option<fmt::Layer<_>> = None;

    let filter = EnvFilter::try_from_env("BPH_LOG").unwrap_or_else(|_| default_filter());

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer);

    // A second init (e.g. from tests) keeps the first subscriber
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn default_filter() -> EnvFilter {
    #[cfg(debug_assertions)]
    {
        EnvFilter::new("debug,hyper=warn,reqwest=warn")
    }
    #[cfg(not(debug_assertions))]
    {
        EnvFilter::new("info,hyper=warn,reqwest=warn")
    }
}
