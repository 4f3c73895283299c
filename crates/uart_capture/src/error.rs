use std::path::PathBuf;

use thiserror::Error;

use crate::outcome::CaptureOutcome;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read timeout must be greater than zero")]
    ZeroReadTimeout,
    #[error("{field} must not be negative (got {secs})")]
    NegativeDuration { field: &'static str, secs: f64 },
    #[error("{field} must be a finite number of seconds")]
    NonFiniteDuration { field: &'static str },
    #[error("{field} is too large (got {secs} seconds)")]
    DurationOutOfRange { field: &'static str, secs: f64 },
}

/// Failures of the transport feeding the session. Always fatal to the session.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error while reading the line source: {0}")]
    Io(#[from] std::io::Error),
    #[error("line source disconnected")]
    Disconnected,
}

#[derive(Debug, Error)]
pub enum NamingError {
    #[error("too many existing files like `{name}`")]
    Exhausted { name: String },
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("capture file is not open")]
    NotOpen,
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error("failed to create capture file `{path}`: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write capture file `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid capture configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// The transport failed mid-session; teardown already ran and `outcome`
    /// describes what was recorded up to that point.
    #[error("transport error after {} data rows: {source}", .outcome.rows_written)]
    Transport {
        #[source]
        source: SourceError,
        outcome: Box<CaptureOutcome>,
    },
}
