//! Shared fixtures for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::{self, Stream};
use std::sync::{Arc, Mutex};
use weblog_common::LogRecord;
use weblog_ingest::{IngestError, SinkError};

pub const APT_LINE: &str = r#"93.180.71.3 - - [17/May/2015:10:05:03 +0000] "GET /downloads/product_1 HTTP/1.1" 304 0 "-" "Debian APT-HTTP/1.3 (0.8.16~exp12ubuntu10.21)" "-""#;

pub const BAD_DATE_LINE: &str =
    r#"10.0.0.9 - - [17/Foo/2015:10:05:03 +0000] "GET /bad-date HTTP/1.1" 200 10 "" "" """#;

pub const GARBAGE_LINE: &str = "this is not an access log line";

/// A well-formed line whose URI is `/item/{n}`
pub fn line(n: usize) -> String {
    format!(
        r#"10.0.0.{} - - [02/Jan/2021:00:00:{:02} +0000] "GET /item/{} HTTP/1.1" 200 {} "-" "test-agent" "-""#,
        n % 250,
        n % 60,
        n,
        n * 10
    )
}

pub fn ok_lines<I, S>(lines: I) -> impl Stream<Item = weblog_ingest::Result<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let items: Vec<weblog_ingest::Result<String>> =
        lines.into_iter().map(|l| Ok(l.into())).collect();
    stream::iter(items)
}

/// Stream of `lines` followed by a read error
pub fn lines_then_error(lines: Vec<String>) -> impl Stream<Item = weblog_ingest::Result<String>> {
    let mut items: Vec<weblog_ingest::Result<String>> = lines.into_iter().map(Ok).collect();
    items.push(Err(IngestError::Read(std::io::Error::new(
        std::io::ErrorKind::ConnectionReset,
        "connection reset",
    ))));
    stream::iter(items)
}

/// Sink that keeps every batch it receives, failing the calls listed in `fail_calls`
#[derive(Default, Clone)]
pub struct RecordingSink {
    batches: Arc<Mutex<Vec<Vec<LogRecord>>>>,
    calls: Arc<Mutex<usize>>,
    fail_calls: Vec<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(fail_calls: Vec<usize>) -> Self {
        Self {
            fail_calls,
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<Vec<LogRecord>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches().iter().map(Vec::len).collect()
    }

    pub fn uris(&self) -> Vec<String> {
        self.batches()
            .into_iter()
            .flatten()
            .map(|record| record.uri)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl weblog_ingest::sink::RecordSink for RecordingSink {
    async fn bulk_insert(&self, records: &[LogRecord]) -> Result<(), SinkError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let call = *calls;
            *calls += 1;
            call
        };

        if self.fail_calls.contains(&call) {
            return Err(SinkError::Storage(format!("insert {call} rejected")));
        }

        self.batches.lock().unwrap().push(records.to_vec());
        Ok(())
    }
}
