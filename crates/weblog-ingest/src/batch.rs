//! Bounded, ordered batching in front of a [`RecordSink`]
//!
//! The writer never holds more than `chunk_size` records. When the pending
//! batch fills up it is handed to the sink and the caller waits for the insert
//! to finish before appending more, which is what bounds memory for a run.

use serde::Serialize;
use tracing::{debug, warn};
use weblog_common::LogRecord;

use crate::error::{IngestError, Result};
use crate::sink::RecordSink;

/// Default number of records per bulk insert
pub const DEFAULT_CHUNK_SIZE: usize = 5;

/// Counters kept across the flushes of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub batches_flushed: usize,
    pub batches_failed: usize,
    pub records_persisted: usize,
    pub records_discarded: usize,
}

/// Outcome of a single flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending
    Empty,
    Persisted(usize),
    /// The sink rejected the batch; its records are gone
    Discarded(usize),
}

/// Accumulates records and flushes them to a sink in fixed-size batches
pub struct BatchWriter<S> {
    sink: S,
    chunk_size: usize,
    pending: Vec<LogRecord>,
    stats: BatchStats,
}

impl<S: RecordSink> BatchWriter<S> {
    pub fn new(sink: S, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(IngestError::Config(
                "chunk_size must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            sink,
            chunk_size,
            pending: Vec::with_capacity(chunk_size),
            stats: BatchStats::default(),
        })
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Add a record, flushing once the batch reaches capacity
    pub async fn append(&mut self, record: LogRecord) -> FlushOutcome {
        self.pending.push(record);
        if self.pending.len() >= self.chunk_size {
            self.flush().await
        } else {
            FlushOutcome::Empty
        }
    }

    /// Hand the pending batch to the sink
    ///
    /// The batch is cleared whether or not the insert succeeds; a failed
    /// batch is logged and dropped without retry.
    pub async fn flush(&mut self) -> FlushOutcome {
        if self.pending.is_empty() {
            return FlushOutcome::Empty;
        }

        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(self.chunk_size));
        let size = batch.len();

        match self.sink.bulk_insert(&batch).await {
            Ok(()) => {
                self.stats.batches_flushed += 1;
                self.stats.records_persisted += size;
                debug!(batch_size = size, total_persisted = self.stats.records_persisted, "Batch stored");
                FlushOutcome::Persisted(size)
            },
            Err(e) => {
                self.stats.batches_failed += 1;
                self.stats.records_discarded += size;
                warn!(
                    error = %e,
                    batch_size = size,
                    first = ?batch.first().map(ToString::to_string),
                    "Failed to store batch, discarding it"
                );
                FlushOutcome::Discarded(size)
            },
        }
    }

    /// Flush the final partial batch at end of stream and return the totals
    pub async fn drain(&mut self) -> BatchStats {
        self.flush().await;
        self.stats
    }
}
