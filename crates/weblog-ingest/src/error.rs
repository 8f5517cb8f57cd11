//! Error types for weblog ingestion
//!
//! Only [`IngestError`] aborts a run. [`MapError`] and [`SinkError`] are
//! recovered locally: the offending record or batch is logged and dropped.

use std::path::PathBuf;
use thiserror::Error;
use weblog_common::RecordError;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Fatal errors that abort a pipeline run
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Failed to fetch {url}: HTTP status {status}")]
    Fetch { url: String, status: u16 },

    #[error("Expected content-type \"text/plain\" from {url}, got \"{content_type}\"")]
    UnexpectedContentType { url: String, content_type: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read from source: {0}")]
    Read(#[source] std::io::Error),

    #[error("Failed to write mirror file {}: {source}", path.display())]
    Mirror {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid access log pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Reasons a matched line could not be turned into a record
#[derive(Error, Debug)]
pub enum MapError {
    #[error("Invalid date {value:?}: {source}")]
    InvalidDate {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Invalid body length {value:?}: {source}")]
    InvalidBodyLength {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("Invalid status {value:?}: {source}")]
    InvalidStatus {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Failures reported by a bulk-insert sink
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for SinkError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db) if db.is_check_violation() => {
                SinkError::Validation(err.to_string())
            },
            other => SinkError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        SinkError::Validation(err.to_string())
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        SinkError::Storage(err.to_string())
    }
}
