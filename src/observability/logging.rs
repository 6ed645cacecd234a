//! Structured logging.
//!
//! # Responsibilities
//! - Install the global `tracing` subscriber from [`LogConfig`]
//! - Optional rolling file sink beside stdout
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - The file sink goes through a non-blocking writer; keep the returned
//!   [`LogGuard`] alive or buffered lines are lost on exit
//! - Installing twice is an error the caller may ignore (tests do)

use std::path::Path;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{LogConfig, LogFormat};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level '{level}': {source}")]
    Filter {
        level: String,
        #[source]
        source: ParseError,
    },

    #[error("cannot open log file: {0}")]
    File(#[from] InitError),

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] TryInitError),
}

/// Flushes the file sink when dropped.
#[derive(Debug, Default)]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

type Filtered = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Filtered> + Send + Sync>;

pub fn init(config: &LogConfig) -> Result<LogGuard, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|source| LoggingError::Filter {
            level: config.level.clone(),
            source,
        })?,
    };

    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(config.format, std::io::stdout, true)];
    let mut guard = LogGuard::default();

    if let Some(filename) = config.filename.as_deref() {
        let appender = rolling_file(filename, config.max_backups)?;
        let (writer, worker) = tracing_appender::non_blocking(appender);
        layers.push(fmt_layer(config.format, writer, false));
        guard._file = Some(worker);
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()?;

    tracing::debug!(
        level = %config.level,
        format = ?config.format,
        file = config.filename.as_deref().unwrap_or("-"),
        "logging initialized"
    );
    Ok(guard)
}

/// Daily rotation; `max_backups` of zero keeps every file.
fn rolling_file(filename: &str, max_backups: usize) -> Result<RollingFileAppender, InitError> {
    let path = Path::new(filename);
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "app.log".to_string());

    let mut builder = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix);
    if max_backups > 0 {
        builder = builder.max_log_files(max_backups);
    }
    builder.build(directory)
}

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true);
    match format {
        LogFormat::Json => layer.json().with_current_span(true).boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}
