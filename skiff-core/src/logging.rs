//! Logging infrastructure for skiff
//!
//! The TUI owns the terminal, so log output goes to a daily-rotated file
//! under the XDG state directory (`~/.local/state/skiff/`). Rotations
//! beyond `logging.max_files` are pruned at startup.

use crate::config::{Config, LoggingConfig};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// File name prefix; the appender adds a `.YYYY-MM-DD` suffix per rotation.
const LOG_FILE_PREFIX: &str = "skiff.log";

/// Initialize the logging system.
///
/// `RUST_LOG` overrides the configured level when set. Returns a guard that
/// must stay alive for the process lifetime; dropping it flushes pending
/// writes.
pub fn init(config: &LoggingConfig) -> crate::error::Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();

    if let Err(e) = prune_old_logs(&log_dir, config.max_files) {
        tracing::warn!(error = %e, "Failed to prune rotated log files");
    }

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Delete the oldest rotated log files, keeping at most `max_files`.
///
/// The date suffix makes rotation names sort lexicographically by age, so
/// the oldest files come first after sorting. Unrelated files in the state
/// directory are left alone.
fn prune_old_logs(dir: &Path, max_files: usize) -> std::io::Result<()> {
    let mut logs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX))
        })
        .collect();

    if logs.len() <= max_files {
        return Ok(());
    }

    logs.sort();
    let excess = logs.len() - max_files;
    for path in logs.into_iter().take(excess) {
        std::fs::remove_file(&path)?;
    }
    Ok(())
}

/// Initialize logging for tests (logs to the test writer)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Guard that keeps the logging system alive
///
/// When dropped, flushes any pending log writes.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Returns the log file path
pub fn log_file_path() -> PathBuf {
    Config::log_path()
}
