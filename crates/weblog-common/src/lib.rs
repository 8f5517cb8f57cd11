//! Weblog Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types and logging setup for the weblog workspace.
//!
//! # Overview
//!
//! - **Types**: the [`LogRecord`] persisted for every accepted access-log line
//! - **Logging**: tracing subscriber configuration used by the binaries
//!
//! # Example
//!
//! ```no_run
//! use weblog_common::LogRecord;
//! use chrono::DateTime;
//!
//! fn build() -> Result<LogRecord, weblog_common::RecordError> {
//!     LogRecord::builder()
//!         .ip_address("93.180.71.3")
//!         .date(DateTime::parse_from_rfc3339("2015-05-17T10:05:03+00:00").unwrap())
//!         .method("GET")
//!         .uri("/downloads/product_1")
//!         .http_version("HTTP/1.1")
//!         .status(304)
//!         .build()
//! }
//! ```

pub mod logging;
pub mod types;

// Re-export commonly used types
pub use types::{LogRecord, LogRecordBuilder, RecordError};
