//! Bulk-insert destinations for access log records
//!
//! Implement [`RecordSink`] for any datastore. A sink receives whole batches
//! in arrival order and either stores all of them or reports a [`SinkError`].

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use weblog_common::LogRecord;

use crate::error::SinkError;

/// Bulk-insert capability injected into the batch writer
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist `records` as one unit, preserving their order
    async fn bulk_insert(&self, records: &[LogRecord]) -> Result<(), SinkError>;
}

#[async_trait]
impl<S: RecordSink + ?Sized> RecordSink for Arc<S> {
    async fn bulk_insert(&self, records: &[LogRecord]) -> Result<(), SinkError> {
        (**self).bulk_insert(records).await
    }
}

/// Writes each record as one JSON object per line
///
/// Used when no database is configured. Concurrent pipelines sharing one
/// sink never interleave within a batch.
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Consume the sink and return the underlying writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> RecordSink for JsonLinesSink<W> {
    async fn bulk_insert(&self, records: &[LogRecord]) -> Result<(), SinkError> {
        // serialize first so a bad record never leaves half a batch behind
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }

        let mut writer = self.writer.lock().await;
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }
}
