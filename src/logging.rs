//! Tracing setup shared by the binaries.
//!
//! Stdout carries program output (updates, packages), so logs go to stderr
//! or to a file:
//! - `VITALGUARD_LOG_MODE=stderr`: always stderr
//! - `VITALGUARD_LOG_MODE=file`: `VITALGUARD_LOG_FILE` (default `vitalguard.log`)
//! - `auto` (default): a file if `VITALGUARD_LOG_FILE` is set, else stderr
//!
//! Every line passes through `SanitizingMakeWriter`. Filtering follows
//! `RUST_LOG`, defaulting to `info`.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::adapters::sanitize::SanitizingMakeWriter;

pub const LOG_MODE_ENV: &str = "VITALGUARD_LOG_MODE";
pub const LOG_FILE_ENV: &str = "VITALGUARD_LOG_FILE";
const DEFAULT_LOG_FILE: &str = "vitalguard.log";

/// Install the global subscriber.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the background writer.
///
/// # Errors
/// Returns an error if the log file cannot be opened.
pub fn init() -> std::io::Result<WorkerGuard> {
    let log_mode = std::env::var(LOG_MODE_ENV).unwrap_or_else(|_| "auto".to_string());
    let log_file = std::env::var(LOG_FILE_ENV).ok();

    let use_file = match log_mode.as_str() {
        "file" => true,
        "stderr" => false,
        // auto
        _ => log_file.is_some(),
    };

    let (writer, guard) = if use_file {
        let log_file = log_file.unwrap_or_else(|| DEFAULT_LOG_FILE.to_string());
        if let Some(parent) = Path::new(&log_file).parent() {
            // Best-effort: a missing directory surfaces as the open error below.
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stderr())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(SanitizingMakeWriter::new(writer)),
        )
        .init();

    Ok(guard)
}
