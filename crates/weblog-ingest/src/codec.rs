//! Line framing for access-log byte streams
//!
//! [`LogLineCodec`] splits on `\n`, `\r`, `\r\n` and `\n\r`. A two-byte
//! terminator counts once, so `a\r\nb` yields `a`, `b` while `a\n\nb` yields
//! `a`, an empty line, `b`. Terminators are never part of a yielded line.
//!
//! Lines longer than the configured maximum are dropped with a warning and
//! never buffered in full.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::warn;

/// Longest line, in bytes, kept by [`LogLineCodec::new`]
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Decoder producing one `String` per log line
#[derive(Debug, Clone)]
pub struct LogLineCodec {
    /// Bytes already scanned without finding a terminator
    next_index: usize,
    max_length: usize,
    /// Inside a line that already exceeded `max_length`
    discarding: bool,
}

impl Default for LogLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LogLineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Codec that drops lines longer than `max_length` bytes
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            next_index: 0,
            max_length,
            discarding: false,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    fn start_discarding(&mut self) {
        if !self.discarding {
            warn!(max_length = self.max_length, "Discarding oversized log line");
        }
        self.discarding = true;
    }

    /// True when the line just split off must be dropped; resets the discard state
    fn finish_line(&mut self, len: usize) -> bool {
        if len > self.max_length {
            self.start_discarding();
        }
        std::mem::take(&mut self.discarding)
    }
}

fn is_terminator(byte: u8) -> bool {
    byte == b'\n' || byte == b'\r'
}

fn is_terminator_pair(first: u8, second: u8) -> bool {
    matches!((first, second), (b'\r', b'\n') | (b'\n', b'\r'))
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl Decoder for LogLineCodec {
    type Item = String;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, std::io::Error> {
        loop {
            let Some(offset) = buf[self.next_index..].iter().position(|b| is_terminator(*b)) else {
                if buf.len() > self.max_length {
                    self.start_discarding();
                    buf.clear();
                    self.next_index = 0;
                } else {
                    self.next_index = buf.len();
                }
                return Ok(None);
            };
            let pos = self.next_index + offset;

            // A lone trailing terminator may be the first half of a pair
            if pos + 1 >= buf.len() {
                self.next_index = pos;
                return Ok(None);
            }

            let terminator_len = if is_terminator_pair(buf[pos], buf[pos + 1]) { 2 } else { 1 };
            let line = buf.split_to(pos);
            buf.advance(terminator_len);
            self.next_index = 0;

            if self.finish_line(line.len()) {
                continue;
            }
            return Ok(Some(decode_line(&line)));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, std::io::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        self.next_index = 0;

        if buf.is_empty() {
            self.discarding = false;
            return Ok(None);
        }

        let end = buf.iter().position(|b| is_terminator(*b)).unwrap_or(buf.len());
        let line = buf.split_to(end);
        buf.clear();

        if self.finish_line(line.len()) {
            return Ok(None);
        }
        Ok(Some(decode_line(&line)))
    }
}
