//! Logging Module
//!
//! Structured logging with file output for diagnostics.

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging with console and file output
pub fn init() {
    let log_dir = get_log_directory();

    // Ensure log directory exists
    let _ = std::fs::create_dir_all(&log_dir);

    // Daily rotation
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "ecostream-monitor.log");

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(file_appender);

    let console_layer = fmt::layer().with_target(true);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer);

    // Set global subscriber
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn get_log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("EcoStream")
        .join("logs")
}
