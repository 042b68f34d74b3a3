//! Logging setup for the engine and the CLI
//!
//! The engine only emits `tracing` events; this module installs a subscriber
//! for binaries and tests that want to see them.

use std::path::Path;
use tracing::Level;
use tracing_appender::{non_blocking::NonBlocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::Registry,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with timestamps
    Pretty,
    /// Single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

/// Log output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// File with daily rotation
    File { directory: String, prefix: String },
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Emit span open/close events, useful with `#[instrument]`ed unification
    pub span_events: bool,
    /// Extra filter directives, e.g. "jelly_infer::analysis=trace"
    pub filter: Option<String>,
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::WARN,
            format: LogFormat::Compact,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
            ansi: true,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }
}

/// Installs the global subscriber.
///
/// The returned guard flushes buffered output when dropped, so keep it alive
/// until the program exits.
pub fn try_init_logging(config: LogConfig) -> Result<WorkerGuard, TryInitError> {
    let (writer, guard) = match &config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogOutput::File { directory, prefix } => {
            tracing_appender::non_blocking(rolling::daily(directory, prefix))
        }
    };
    let ansi = config.ansi && !matches!(config.output, LogOutput::File { .. });

    tracing_subscriber::registry()
        .with(format_layer(&config, writer, ansi).with_filter(build_filter(&config)))
        .try_init()?;
    Ok(guard)
}

/// Like [`try_init_logging`], but a subscriber that is already installed is
/// left in place.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    try_init_logging(config).ok()
}

fn format_layer(
    config: &LogConfig,
    writer: NonBlocking,
    ansi: bool,
) -> Box<dyn Layer<Registry> + Send + Sync> {
    let spans = span_events_config(config.span_events);
    let layer = fmt::layer().with_writer(writer).with_span_events(spans).with_ansi(ansi);
    match config.format {
        LogFormat::Pretty => Box::new(layer.pretty()),
        LogFormat::Compact => Box::new(layer.compact()),
        LogFormat::Json => Box::new(layer.json()),
    }
}

fn build_filter(config: &LogConfig) -> EnvFilter {
    let base_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    match &config.filter {
        Some(filter_str) => filter_str
            .split(',')
            .filter(|directive| !directive.trim().is_empty())
            .fold(base_filter, |filter, directive| match directive.trim().parse() {
                Ok(parsed) => filter.add_directive(parsed),
                Err(_) => {
                    tracing::warn!("Invalid filter directive: {}", directive);
                    filter
                }
            }),
        None => base_filter,
    }
}

fn span_events_config(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// Verbose logging for development: debug level with span events.
pub fn init_dev_logging() -> Option<WorkerGuard> {
    init_logging(LogConfig {
        level: Level::DEBUG,
        format: LogFormat::Pretty,
        output: LogOutput::Stderr,
        span_events: true,
        filter: Some("jelly_infer=debug".to_string()),
        ansi: true,
    })
}

/// JSON logs into daily files under `log_dir`.
pub fn init_prod_logging(log_dir: impl AsRef<Path>) -> Option<WorkerGuard> {
    init_logging(LogConfig {
        level: Level::INFO,
        format: LogFormat::Json,
        output: LogOutput::File {
            directory: log_dir.as_ref().to_string_lossy().to_string(),
            prefix: "jelly-infer".to_string(),
        },
        span_events: false,
        filter: Some("jelly_infer=info,warn".to_string()),
        ansi: false,
    })
}
