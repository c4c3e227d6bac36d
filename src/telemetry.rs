//! Telemetry and observability setup
//!
//! Configures structured logging with tracing and tracing-subscriber, and
//! defines the [`Logger`] capability injected into generation components.

use std::fmt;
use std::sync::{Mutex, Once};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Initialize tracing subscriber for structured logging
///
/// This can only be called once per process. Subsequent calls are silently ignored.
///
/// Reads log level from RUST_LOG environment variable, defaulting to the
/// level specified in config (or "info" if not set).
///
/// # Examples
///
/// ```no_run
/// tarot_adviser::telemetry::init("info");
/// tracing::info!("Application started");
/// ```
pub fn init(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "tarot_adviser={},tower_http=debug",
                default_level
            ))
        });

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    });
}

/// Severity of a [`Logger`] event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        })
    }
}

/// Structured key/value pairs attached to an event
pub type Fields<'a> = &'a [(&'static str, String)];

/// Logging capability handed to components at construction
///
/// `event` is a stable snake_case name (e.g. `"adviser_retry"`) so
/// recorded output can be asserted on.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, event: &str, fields: Fields<'_>);

    fn debug(&self, event: &str, fields: Fields<'_>) {
        self.log(LogLevel::Debug, event, fields);
    }

    fn info(&self, event: &str, fields: Fields<'_>) {
        self.log(LogLevel::Info, event, fields);
    }

    fn warn(&self, event: &str, fields: Fields<'_>) {
        self.log(LogLevel::Warn, event, fields);
    }

    fn error(&self, event: &str, fields: Fields<'_>) {
        self.log(LogLevel::Error, event, fields);
    }
}

/// [`Logger`] that forwards to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, event: &str, fields: Fields<'_>) {
        let fields = render_fields(fields);
        match level {
            LogLevel::Debug => tracing::debug!(event = %event, fields = %fields, "{}", event),
            LogLevel::Info => tracing::info!(event = %event, fields = %fields, "{}", event),
            LogLevel::Warn => tracing::warn!(event = %event, fields = %fields, "{}", event),
            LogLevel::Error => tracing::error!(event = %event, fields = %fields, "{}", event),
        }
    }
}

fn render_fields(fields: Fields<'_>) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One event captured by [`RecordingLogger`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub event: String,
    pub fields: Vec<(&'static str, String)>,
}

impl LogRecord {
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// [`Logger`] that keeps every event in memory
///
/// Used by tests to assert on retry, cache and fallback behavior.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<LogRecord>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Records whose event name matches
    pub fn events(&self, event: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.event == event)
            .collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events(event).len()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: LogLevel, event: &str, fields: Fields<'_>) {
        let record = LogRecord {
            level,
            event: event.to_string(),
            fields: fields.to_vec(),
        };
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}
