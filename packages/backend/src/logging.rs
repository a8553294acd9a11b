//! Tracing setup for the MACE service.
//!
//! A bare level such as `debug` applies to the two MACE crates only; other
//! crates stay at `warn`. Full `EnvFilter` directives are used as given.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "mace.log";

/// Keeps the non-blocking file writer alive; drop it last
pub struct FileLogGuard {
    _guard: WorkerGuard,
}

/// Directory for the rolling log file, when `MACE_FILE_LOGS` is on
pub fn file_log_dir() -> Option<String> {
    let enabled = std::env::var("MACE_FILE_LOGS")
        .map(|v| matches!(v.trim(), "true" | "1"))
        .unwrap_or(false);
    enabled.then(|| std::env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string()))
}

/// Expand a bare level into per-crate directives
pub fn filter_directives(log_level: &str) -> String {
    let level = log_level.trim();
    if level.is_empty() {
        return "warn,mace_backend=info,mace_algo=info".to_string();
    }
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    format!("warn,mace_backend={level},mace_algo={level}")
}

pub fn init_tracing(log_level: &str) -> Option<FileLogGuard> {
    let env_filter = EnvFilter::try_new(filter_directives(log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn,mace_backend=info,mace_algo=info"));

    let mut guard = None;
    let file_layer = file_log_dir().and_then(|dir| match std::fs::create_dir_all(&dir) {
        Ok(()) => {
            let appender = RollingFileAppender::new(Rotation::DAILY, &dir, LOG_FILE_PREFIX);
            let (writer, worker) = tracing_appender::non_blocking(appender);
            guard = Some(FileLogGuard { _guard: worker });
            Some(fmt::layer().with_writer(writer).with_ansi(false).with_target(true))
        }
        Err(err) => {
            eprintln!("file logging disabled, cannot create {dir}: {err}");
            None
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .init();

    guard
}
