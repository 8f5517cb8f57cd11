//! Weblog Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Streams web-server access logs from a file or an HTTP URL, parses every
//! line against the extended NCSA grammar and stores the resulting records in
//! bounded batches.
//!
//! # Components
//!
//! - [`source`]: file and HTTP line streams
//! - [`parser`]: regex grammar, one line to [`parser::LogFields`]
//! - [`mapper`]: fields to [`weblog_common::LogRecord`]
//! - [`batch`]: bounded batching in front of a [`sink::RecordSink`]
//! - [`pipeline`]: wiring, blank-line filtering and raw-line mirroring
//!
//! # Example
//!
//! ```no_run
//! use weblog_ingest::{config::IngestConfig, pipeline::Pipeline, sink::JsonLinesSink};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let sink = JsonLinesSink::new(tokio::io::stdout());
//!     let report = Pipeline::from_config(&config, sink)?
//!         .ingest_url("https://example.com/access.log")
//!         .await?;
//!     tracing::info!(stored = report.batches.records_persisted, "done");
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod codec;
pub mod config;
pub mod error;
pub mod mapper;
pub mod mirror;
pub mod parser;
pub mod pipeline;
#[cfg(feature = "database")]
pub mod postgres;
pub mod sink;
pub mod source;

pub use error::{IngestError, MapError, Result, SinkError};
