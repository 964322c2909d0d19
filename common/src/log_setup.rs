use std::path::PathBuf;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LogSetupError {
    #[error("Invalid log filter '{filter}': {message}")]
    Filter { filter: String, message: String },
    #[error("Failed to create log directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to create log file appender: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),
    #[error("Logging already initialized")]
    AlreadyInitialized,
}

/// Where and how much to log. `RUST_LOG` overrides `level`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log file name prefix; files are `<dir>/<prefix>.<date>.log`.
    pub prefix: String,
    pub dir: PathBuf,
    pub level: String,
    /// Daily files kept before the oldest is deleted.
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            prefix: "meshgrid".into(),
            dir: PathBuf::from("logs"),
            level: "info".into(),
            max_files: 5,
        }
    }
}

impl LogConfig {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    fn filter(&self) -> Result<EnvFilter, LogSetupError> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .map_err(|e| LogSetupError::Filter {
                filter: self.level.clone(),
                message: e.to_string(),
            })
    }
}

/// Installs the global subscriber: console output (warnings and errors to
/// stderr) plus a daily-rolling log file.
pub fn setup_logging(config: &LogConfig) -> Result<(), LogSetupError> {
    let env_filter = config.filter()?;

    std::fs::create_dir_all(&config.dir).map_err(|source| LogSetupError::Directory {
        path: config.dir.clone(),
        source,
    })?;

    let file_appender = Builder::new()
        .rotation(Rotation::DAILY)
        .filename_prefix(&config.prefix)
        .filename_suffix("log")
        .max_log_files(config.max_files)
        .build(&config.dir)?;

    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    LOG_GUARD
        .set(guard)
        .map_err(|_| LogSetupError::AlreadyInitialized)?;

    let console_writer = std::io::stdout.and(std::io::stderr.with_min_level(Level::WARN));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(true)
        .with_writer(console_writer);

    // Pool threads are named, so the file shows which worker logged.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_thread_names(true)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|_| LogSetupError::AlreadyInitialized)
}
