//! Console logging, with an optional copy written to a file.
//!
//! # Initialization
//!
//! Call [`init`] once at startup. The returned guard must be kept alive for
//! the rest of `main`: dropping it flushes and stops the background writer
//! used for the log file.
//!
//! # Level precedence
//!
//! `--log-level` flag, then `$WEBHOOK_PATCHER_LOG_LEVEL`, then `log_level` in
//! the config file, then `info`. Unparseable values at any step are skipped.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::prelude::*;

pub const LOG_LEVEL_ENV_VAR: &str = "WEBHOOK_PATCHER_LOG_LEVEL";

/// Log verbosity levels, ordered from least to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "ERROR"),
            Self::Warn => write!(f, "WARN"),
            Self::Info => write!(f, "INFO"),
            Self::Debug => write!(f, "DEBUG"),
            Self::Trace => write!(f, "TRACE"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLogLevelError;

impl std::fmt::Display for ParseLogLevelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid log level")
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(ParseLogLevelError),
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}

pub fn resolve_log_level(
    cli_level: Option<&str>,
    env_level: Option<&str>,
    config_level: Option<&str>,
) -> LogLevel {
    [cli_level, env_level, config_level]
        .into_iter()
        .flatten()
        .find_map(|level| level.parse().ok())
        .unwrap_or(LogLevel::Info)
}

/// Install the global subscriber.
///
/// Lines go to stdout. When `log_file` is set they are also appended to that
/// file, without ANSI colors. A log file that cannot be opened is reported on
/// stderr and otherwise ignored.
pub fn init(level: LogLevel, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let (file_layer, guard) = match log_file.map(open_log_file) {
        Some(Ok((writer, guard))) => (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        ),
        Some(Err(err)) => {
            eprintln!("warning: {err}; logging to stdout only");
            (None, None)
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .with(filter_for(level))
        .try_init();

    guard
}

/// `level` applies to this crate; dependencies only report warnings.
fn filter_for(level: LogLevel) -> EnvFilter {
    EnvFilter::new(format!("warn,webhook_patcher={}", LevelFilter::from(level)))
}

fn open_log_file(
    path: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), String> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| format!("cannot open log file {}: {err}", path.display()))?;
    Ok(tracing_appender::non_blocking(file))
}
