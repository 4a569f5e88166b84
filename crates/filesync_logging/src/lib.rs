//! Shared logging setup for filesync binaries.
//!
//! Installs a `tracing` registry with two layers: a daily log file under
//! `<filesync home>/logs`, written off-thread through `tracing-appender`, and a
//! console layer on stderr.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "filesync=info,filesync_logging=info";
const MAX_LOG_FILES: usize = 7;

/// Logging configuration for a filesync binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Widen console output to debug.
    pub verbose: bool,
    /// Overrides `<filesync home>/logs`.
    pub log_dir: Option<PathBuf>,
}

/// Keeps the background log writer alive. Buffered lines are flushed on drop,
/// so hold it until the process exits.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize tracing with a daily rolling file and stderr output.
///
/// `RUST_LOG` overrides the default filter for both layers. When the log
/// directory cannot be prepared, only the console layer is installed.
pub fn init_logging(config: LogConfig<'_>) -> Result<LogGuard> {
    let mut file_guard = None;
    let file_layer = match prepare_log_dir(config.log_dir.as_deref())
        .and_then(|dir| file_appender(&dir, config.app_name).map(|appender| (dir, appender)))
    {
        Ok((dir, appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            file_guard = Some((dir, guard));
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_filter(env_filter()),
            )
        }
        Err(err) => {
            eprintln!("Warning: file logging disabled: {:#}", err);
            None
        }
    };

    let console_filter = if config.verbose {
        EnvFilter::new("filesync=debug,filesync_logging=debug")
    } else {
        env_filter()
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(LogGuard {
        _file: file_guard.map(|(dir, guard)| {
            tracing::debug!(log_dir = %dir.display(), "Logging initialized");
            guard
        }),
    })
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn prepare_log_dir(log_dir: Option<&Path>) -> Result<PathBuf> {
    match log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            Ok(dir.to_path_buf())
        }
        None => ensure_logs_dir(),
    }
}

/// `<app_name>.<date>.log`, rolled daily, oldest files pruned.
fn file_appender(dir: &Path, app_name: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(app_name)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .with_context(|| format!("Failed to open log file for {} in {}", app_name, dir.display()))
}

/// Filesync home directory: `$FILESYNC_HOME`, else `~/.filesync`.
pub fn filesync_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("FILESYNC_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .map(|home| home.join(".filesync"))
        .unwrap_or_else(|| PathBuf::from(".").join(".filesync"))
}

/// Logs directory: `<filesync home>/logs`
pub fn logs_dir() -> PathBuf {
    filesync_home().join("logs")
}

/// Ensure the logs directory exists and return it.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    fs::create_dir_all(&logs)
        .with_context(|| format!("Failed to create logs directory: {}", logs.display()))?;
    Ok(logs)
}
