//! Subscriber setup for the `chanbridge` binary.
//!
//! Stdout carries channel frames, so log lines never go there: they land in a
//! daily rolling file under the log dir and, when enabled, on stderr.

use crate::{config::LoggingConfig, paths::AppDirs};
use std::cmp::Reverse;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILE: &str = "chanbridge.log";

/// Flushes the file sink when dropped. Hold it for the life of the process.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

pub fn init_logging(config: &LoggingConfig, dirs: &AppDirs) -> Result<LoggingGuard, LoggingError> {
    let directive = config.level.as_filter_directive();
    let filter = EnvFilter::try_new(directive).map_err(|source| LoggingError::ParseLevel {
        level: directive.to_string(),
        source,
    })?;

    let (file, guard) = if config.file {
        let (writer, guard) = open_file_sink(config, dirs.log_dir())?;
        (Some(writer), Some(guard))
    } else {
        (None, None)
    };

    let writer = match (file, config.stderr) {
        (Some(file), true) => BoxMakeWriter::new(std::io::stderr.and(file)),
        (Some(file), false) => BoxMakeWriter::new(file),
        (None, true) => BoxMakeWriter::new(std::io::stderr),
        (None, false) => BoxMakeWriter::new(std::io::sink),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .try_init()
        .map_err(LoggingError::SubscriberInstall)?;

    Ok(LoggingGuard { _file: guard })
}

/// Creates `log_dir`, prunes old rotations and starts the background writer.
fn open_file_sink(config: &LoggingConfig, log_dir: &Path) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    fs::create_dir_all(log_dir).map_err(|source| LoggingError::CreateDirectory {
        path: log_dir.to_path_buf(),
        source,
    })?;

    let file_name = config.file_name.as_deref().unwrap_or(DEFAULT_LOG_FILE);
    prune_rotations(log_dir, file_name, config.max_log_files.max(1))?;

    let appender = tracing_appender::rolling::daily(log_dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Keeps the `keep` most recently modified files named after `file_name`
/// and deletes the rest.
fn prune_rotations(dir: &Path, file_name: &str, keep: usize) -> Result<(), LoggingError> {
    let listing = fs::read_dir(dir).map_err(|source| LoggingError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut rotations: Vec<(SystemTime, PathBuf)> = listing
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(file_name))
        .filter_map(|entry| {
            let modified = entry.metadata().and_then(|meta| meta.modified()).ok()?;
            Some((modified, entry.path()))
        })
        .collect();
    rotations.sort_by_key(|(modified, path)| (Reverse(*modified), Reverse(path.clone())));

    for (_, path) in rotations.into_iter().skip(keep) {
        tracing::debug!(path = %path.display(), "removing old log file");
        fs::remove_file(&path).map_err(|source| LoggingError::Cleanup { path, source })?;
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid log level {level}: {source}")]
    ParseLevel {
        level: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    SubscriberInstall(Box<dyn std::error::Error + Send + Sync>),
    #[error("failed to list log directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to remove old log file {path}: {source}")]
    Cleanup {
        path: PathBuf,
        source: std::io::Error,
    },
}
