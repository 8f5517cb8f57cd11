//! Access log ingestion pipeline
//!
//! Wires a line stream through the blank-line filter, the parser and the
//! mapper into a [`BatchWriter`], one line at a time. Each run is a single
//! sequential task; the only waits are for the next line and for a bulk insert.
//!
//! # Example
//!
//! ```no_run
//! use weblog_ingest::{config::IngestConfig, pipeline::Pipeline, sink::JsonLinesSink};
//!
//! # async fn run() -> weblog_ingest::Result<()> {
//! let config = IngestConfig::new().with_chunk_size(100);
//! let pipeline = Pipeline::from_config(&config, JsonLinesSink::new(tokio::io::stdout()))?;
//! let report = pipeline.ingest_file("access.log").await?;
//! println!("{} records stored", report.batches.records_persisted);
//! # Ok(())
//! # }
//! ```

use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, error, info, info_span, Instrument};

use crate::batch::{BatchStats, BatchWriter};
use crate::codec::{LogLineCodec, DEFAULT_MAX_LINE_LENGTH};
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::mapper::{MapOutcome, RecordMapper};
use crate::mirror::RawLineMirror;
use crate::parser::{LogLineParser, ParseOutcome};
use crate::sink::RecordSink;
use crate::source;

/// Traversal state of the line source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    Streaming,
    Eof,
    Error,
}

/// Summary of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub state: SourceState,
    pub lines_read: usize,
    pub blank_lines: usize,
    pub lines_matched: usize,
    pub lines_unmatched: usize,
    pub records_mapped: usize,
    pub mapping_failures: usize,
    pub lines_mirrored: usize,
    pub batches: BatchStats,
}

impl IngestReport {
    fn new() -> Self {
        Self {
            state: SourceState::Streaming,
            lines_read: 0,
            blank_lines: 0,
            lines_matched: 0,
            lines_unmatched: 0,
            records_mapped: 0,
            mapping_failures: 0,
            lines_mirrored: 0,
            batches: BatchStats::default(),
        }
    }
}

/// True for empty lines and lines made only of `\r` / `\n`
pub fn is_blank(line: &str) -> bool {
    line.trim_matches(|c| c == '\r' || c == '\n').is_empty()
}

/// One ingestion run: parser, mapper, batch writer and optional mirror
pub struct Pipeline<S> {
    parser: LogLineParser,
    mapper: RecordMapper,
    writer: BatchWriter<S>,
    mirror: Option<RawLineMirror>,
    http_client: Option<reqwest::Client>,
    max_line_length: usize,
}

impl<S: RecordSink> Pipeline<S> {
    pub fn new(parser: LogLineParser, mapper: RecordMapper, writer: BatchWriter<S>) -> Self {
        Self {
            parser,
            mapper,
            writer,
            mirror: None,
            http_client: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    /// Assemble a pipeline writing into `sink` from `config`
    pub fn from_config(config: &IngestConfig, sink: S) -> Result<Self> {
        config.validate()?;

        let parser = LogLineParser::new(&config.log_pattern)?;
        let mapper = RecordMapper::new(config.date_format.as_str());
        let writer = BatchWriter::new(sink, config.chunk_size)?;

        let mut pipeline = Self::new(parser, mapper, writer)
            .with_http_client(config.http_client()?)
            .with_max_line_length(config.max_line_length);
        if config.save {
            let mirror = match config.mirror_path {
                Some(ref path) => RawLineMirror::to_path(path),
                None => RawLineMirror::in_dir(&config.mirror_dir, Utc::now()),
            };
            pipeline = pipeline.with_mirror(mirror);
        }

        Ok(pipeline)
    }

    pub fn with_mirror(mut self, mirror: RawLineMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Skip source lines longer than `max_line_length` bytes
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    fn codec(&self) -> LogLineCodec {
        LogLineCodec::with_max_length(self.max_line_length)
    }

    /// Read and ingest a local log file
    pub async fn ingest_file(self, path: impl AsRef<Path>) -> Result<IngestReport> {
        let path = path.as_ref();
        let span = info_span!("ingest", source = %path.display());

        async move {
            let lines = source::open_file(path, self.codec()).await?;
            self.run(lines).await
        }
        .instrument(span)
        .await
    }

    /// Fetch and ingest a remote log
    pub async fn ingest_url(mut self, url: &str) -> Result<IngestReport> {
        let span = info_span!("ingest", source = %url);

        async move {
            let client = match self.http_client.take() {
                Some(client) => client,
                None => reqwest::Client::new(),
            };
            let lines = source::fetch_url(&client, url, self.codec()).await?;
            self.run(lines).await
        }
        .instrument(span)
        .await
    }

    /// Drive `lines` to completion
    ///
    /// A source error stops the run immediately: already flushed batches
    /// stay stored, the pending batch is not flushed, and the error is
    /// returned unchanged.
    pub async fn run<L>(mut self, lines: L) -> Result<IngestReport>
    where
        L: Stream<Item = Result<String>>,
    {
        let mut lines = std::pin::pin!(lines);
        let mut report = IngestReport::new();

        while report.state == SourceState::Streaming {
            match lines.next().await {
                Some(Ok(line)) => {
                    if let Err(e) = self.process_line(&line, &mut report).await {
                        report.state = SourceState::Error;
                        return self.abort(e, report).await;
                    }
                },
                Some(Err(e)) => {
                    report.state = SourceState::Error;
                    return self.abort(e, report).await;
                },
                None => report.state = SourceState::Eof,
            }
        }

        report.batches = self.writer.drain().await;
        if let Some(mirror) = self.mirror.take() {
            report.lines_mirrored = mirror.lines_written();
            mirror.close().await?;
        }

        info!(
            lines_read = report.lines_read,
            lines_matched = report.lines_matched,
            lines_unmatched = report.lines_unmatched,
            mapping_failures = report.mapping_failures,
            records_persisted = report.batches.records_persisted,
            records_discarded = report.batches.records_discarded,
            "Ingestion finished"
        );

        Ok(report)
    }

    async fn process_line(&mut self, line: &str, report: &mut IngestReport) -> Result<()> {
        report.lines_read += 1;

        if is_blank(line) {
            report.blank_lines += 1;
            return Ok(());
        }

        let fields = match self.parser.parse(line) {
            ParseOutcome::Matched(fields) => fields,
            ParseOutcome::NoMatch => {
                report.lines_unmatched += 1;
                return Ok(());
            },
        };
        report.lines_matched += 1;

        if let Some(ref mut mirror) = self.mirror {
            mirror.write_line(line).await?;
        }

        match self.mapper.map(&fields) {
            MapOutcome::Mapped(record) => {
                report.records_mapped += 1;
                self.writer.append(record).await;
            },
            MapOutcome::MapFailed(_) => report.mapping_failures += 1,
        }

        Ok(())
    }

    async fn abort(mut self, err: IngestError, report: IngestReport) -> Result<IngestReport> {
        error!(
            error = %err,
            state = ?report.state,
            lines_read = report.lines_read,
            records_persisted = self.writer.stats().records_persisted,
            pending = self.writer.pending_len(),
            "Ingestion aborted"
        );

        if let Some(mirror) = self.mirror.take() {
            if let Err(close_err) = mirror.close().await {
                debug!(error = %close_err, "Failed to close mirror file after abort");
            }
        }

        Err(err)
    }
}
