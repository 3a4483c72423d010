//! Error taxonomy for the relay.
//!
//! Per-line and per-subscriber errors are isolated by the dispatch engine and
//! never escape a cycle. Only `WatcherFailure` is fatal to the process.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    /// The line does not have the `<timestamp> [<LEVEL>] <text>` shape or its
    /// timestamp does not parse.
    #[error("malformed log line: {reason}")]
    MalformedLine { reason: String },

    /// The level token is not part of the configured severity order.
    #[error("unknown severity level '{0}'")]
    UnknownSeverity(String),

    /// Delivery to a single subscriber failed. Transient by contract.
    #[error("failed to deliver to subscriber {subscriber}: {reason}")]
    TransportFailure { subscriber: String, reason: String },

    /// The log file is missing or unreadable at cycle start.
    #[error("log file {path} is unavailable: {source}")]
    FileUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The filesystem listener itself failed; no further change signals will
    /// arrive.
    #[error("file watcher failed: {0}")]
    WatcherFailure(String),

    /// The subscriber directory could not be read or persisted.
    #[error("subscriber store error: {0}")]
    Store(String),
}

impl RelayError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedLine {
            reason: reason.into(),
        }
    }

    /// A short label used for the `reason` metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedLine { .. } => "malformed",
            Self::UnknownSeverity(_) => "unknown_severity",
            Self::TransportFailure { .. } => "transport",
            Self::FileUnavailable { .. } => "file_unavailable",
            Self::WatcherFailure(_) => "watcher",
            Self::Store(_) => "store",
        }
    }

    /// Whether this error must take the whole relay down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::WatcherFailure(_))
    }
}

impl From<notify::Error> for RelayError {
    fn from(e: notify::Error) -> Self {
        Self::WatcherFailure(e.to_string())
    }
}
