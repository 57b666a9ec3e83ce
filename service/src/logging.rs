//! Logging capability consumed by the HTTP helpers.
//!
//! The helpers never create a logger. A host service hands one in as an
//! `Arc<dyn Logger>`, usually a [`TracingLogger`], and every log call goes
//! through the three severity-leveled operations of [`Logger`].
//!
//! Per-request fields travel separately in a [`LogContext`], which the
//! request-id middleware stores in request extensions.

use std::convert::Infallible;

use axum::{extract::FromRequestParts, http::request::Parts};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// A single key-value attachment passed alongside a log message.
pub type Fields = Map<String, Value>;

/// Minimal logging interface required by the helpers.
///
/// Attachments are an ordered sequence; backends merge them left to right
/// (see [`merge_fields`]).
pub trait Logger: Send + Sync {
    fn debug(&self, msg: &str, fields: &[Fields]);
    fn info(&self, msg: &str, fields: &[Fields]);
    fn error(&self, msg: &str, fields: &[Fields]);
}

/// Build a [`Fields`] map from key-value pairs.
///
/// ```
/// use httpkit::logging::fields;
///
/// let f = fields([("addr", "0.0.0.0:8080")]);
/// assert_eq!(f["addr"], "0.0.0.0:8080");
/// ```
pub fn fields<I, K, V>(pairs: I) -> Fields
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Flatten an attachment sequence into one map. Later keys win.
#[must_use]
pub fn merge_fields(attachments: &[Fields]) -> Fields {
    let mut merged = Fields::new();
    for attachment in attachments {
        for (k, v) in attachment {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

/// Per-request logging fields.
///
/// Handlers can take it as an extractor; when no tagging middleware ran the
/// context is simply empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogContext {
    fields: Fields,
}

impl LogContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child context with `key` set to `value`.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Derive a child context with every entry of `fields` added.
    #[must_use]
    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields.extend(fields);
        self
    }

    #[must_use]
    pub const fn fields(&self) -> &Fields {
        &self.fields
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The context fields followed by `extra`, ready to hand to a [`Logger`].
    #[must_use]
    pub fn attachments(&self, extra: &[Fields]) -> Vec<Fields> {
        let mut all = Vec::with_capacity(extra.len() + 1);
        if !self.fields.is_empty() {
            all.push(self.fields.clone());
        }
        all.extend_from_slice(extra);
        all
    }

    pub fn debug(&self, log: &dyn Logger, msg: &str, extra: &[Fields]) {
        log.debug(msg, &self.attachments(extra));
    }

    pub fn info(&self, log: &dyn Logger, msg: &str, extra: &[Fields]) {
        log.info(msg, &self.attachments(extra));
    }

    pub fn error(&self, log: &dyn Logger, msg: &str, extra: &[Fields]) {
        log.error(msg, &self.attachments(extra));
    }
}

impl<S> FromRequestParts<S> for LogContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned().unwrap_or_default())
    }
}

/// [`Logger`] backed by `tracing` events.
///
/// Attachments are merged and rendered as a single JSON `fields` value.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

macro_rules! emit {
    ($level:expr, $msg:expr, $fields:expr) => {{
        let merged = merge_fields($fields);
        if merged.is_empty() {
            tracing::event!($level, "{}", $msg);
        } else {
            // `event!` brings its own `Value` into scope; render outside it.
            let rendered = Value::Object(merged);
            tracing::event!($level, fields = %rendered, "{}", $msg);
        }
    }};
}

impl Logger for TracingLogger {
    fn debug(&self, msg: &str, fields: &[Fields]) {
        emit!(tracing::Level::DEBUG, msg, fields);
    }

    fn info(&self, msg: &str, fields: &[Fields]) {
        emit!(tracing::Level::INFO, msg, fields);
    }

    fn error(&self, msg: &str, fields: &[Fields]) {
        emit!(tracing::Level::ERROR, msg, fields);
    }
}

/// Errors raised while installing the tracing subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log level '{level}': {source}")]
    Filter {
        level: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Install the global `fmt` subscriber filtered by `config.level`.
///
/// # Errors
/// Returns an error if the level is not a valid filter directive or a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_new(&config.level).map_err(|source| LoggingError::Filter {
        level: config.level.clone(),
        source,
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))
}

#[cfg(any(test, feature = "test-utils"))]
#[allow(clippy::expect_used)]
pub mod mock {
    //! In-memory logger for tests

    use super::{merge_fields, Fields, Logger};
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Level {
        Debug,
        Info,
        Error,
    }

    /// One recorded call, with its attachments already merged.
    #[derive(Debug, Clone, PartialEq)]
    pub struct LogEntry {
        pub level: Level,
        pub message: String,
        pub fields: Fields,
        /// Number of attachments passed to the call before merging.
        pub attachment_count: usize,
    }

    /// Logger that records every call for later assertions.
    #[derive(Debug, Default)]
    pub struct RecordingLogger {
        entries: Mutex<Vec<LogEntry>>,
    }

    impl RecordingLogger {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        fn record(&self, level: Level, msg: &str, fields: &[Fields]) {
            self.entries.lock().expect("lock poisoned").push(LogEntry {
                level,
                message: msg.to_string(),
                fields: merge_fields(fields),
                attachment_count: fields.len(),
            });
        }

        /// Snapshot of every recorded call, in order.
        ///
        /// # Panics
        ///
        /// Panics if the internal mutex is poisoned.
        #[must_use]
        pub fn entries(&self) -> Vec<LogEntry> {
            self.entries.lock().expect("lock poisoned").clone()
        }

        /// Recorded calls at `level`, in order.
        #[must_use]
        pub fn at(&self, level: Level) -> Vec<LogEntry> {
            self.entries()
                .into_iter()
                .filter(|e| e.level == level)
                .collect()
        }

        /// Index of the first call at `level` with exactly `message`.
        #[must_use]
        pub fn position(&self, level: Level, message: &str) -> Option<usize> {
            self.entries()
                .iter()
                .position(|e| e.level == level && e.message == message)
        }

        #[must_use]
        pub fn contains(&self, level: Level, message: &str) -> bool {
            self.position(level, message).is_some()
        }
    }

    impl Logger for RecordingLogger {
        fn debug(&self, msg: &str, fields: &[Fields]) {
            self.record(Level::Debug, msg, fields);
        }

        fn info(&self, msg: &str, fields: &[Fields]) {
            self.record(Level::Info, msg, fields);
        }

        fn error(&self, msg: &str, fields: &[Fields]) {
            self.record(Level::Error, msg, fields);
        }
    }
}
