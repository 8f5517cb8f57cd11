//! Extended NCSA access-log line parser
//!
//! # Format
//! ```text
//! 93.180.71.3 - - [17/May/2015:10:05:03 +0000] "GET /downloads/product_1 HTTP/1.1" 304 0 "-" "Debian APT-HTTP/1.3" "-"
//! ```
//!
//! The grammar is a single regular expression with 13 capture groups. The
//! parser does no I/O and never fails on input: a line either yields its
//! [`LogFields`] or [`ParseOutcome::NoMatch`].

use regex::{Captures, Regex};
use tracing::warn;

use crate::error::{IngestError, Result};

/// Default grammar for extended NCSA (combined) access logs
///
/// Groups, in order: address, extra address segments, ident, auth user,
/// timestamp, method, uri, http version, status, body length, referer,
/// user agent, trailing quoted field.
pub const DEFAULT_ACCESS_LOG_PATTERN: &str = concat!(
    r"(\d+\.\d+\.\d+\.\d+)",
    r"(?:\.(.*))? ",
    r"(.*) ",
    r"(.*) ",
    r"\[(\d{1,2}/\w+/\d{4}:\d{2}:\d{2}:\d{2} [+-]\d+)\] ",
    r#""(\w+) "#,
    r"(.+) ",
    r#"(HTTP/\d\.\d)" "#,
    r"(\d{3}) ",
    r"(\d+|-) ",
    r#""(.*)" "#,
    r#""(.*)" "#,
    r#""(.*)""#,
);

/// Number of capture groups every access log pattern must define
pub const FIELD_COUNT: usize = 13;

/// Raw text groups captured from one access log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFields {
    pub ip_address: String,
    pub additional_ip_info: Option<String>,
    pub ident: String,
    pub auth_user: String,
    pub timestamp: String,
    pub method: String,
    pub uri: String,
    pub http_version: String,
    pub status: String,
    pub body_length: String,
    pub referer: String,
    pub user_agent: String,
    pub trailing: String,
}

/// Result of matching one line against the grammar
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Matched(LogFields),
    NoMatch,
}

impl ParseOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, ParseOutcome::Matched(_))
    }
}

/// Matches lines against an access log grammar
#[derive(Debug, Clone)]
pub struct LogLineParser {
    pattern: Regex,
}

impl LogLineParser {
    /// Compile a parser for `pattern`
    ///
    /// The pattern must define exactly [`FIELD_COUNT`] capture groups.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)?;

        // captures_len includes the implicit whole-match group
        let groups = pattern.captures_len() - 1;
        if groups != FIELD_COUNT {
            return Err(IngestError::Config(format!(
                "access log pattern must define {} capture groups, found {}",
                FIELD_COUNT, groups
            )));
        }

        Ok(Self { pattern })
    }

    /// Match a single non-blank line
    pub fn parse(&self, line: &str) -> ParseOutcome {
        match self.pattern.captures(line) {
            Some(caps) => ParseOutcome::Matched(fields_from_captures(&caps)),
            None => {
                warn!(line = %line, "Line does not match access log pattern");
                ParseOutcome::NoMatch
            },
        }
    }
}

fn fields_from_captures(caps: &Captures<'_>) -> LogFields {
    let group = |i: usize| caps.get(i).map_or_else(String::new, |m| m.as_str().to_string());

    LogFields {
        ip_address: group(1),
        additional_ip_info: caps.get(2).map(|m| m.as_str().to_string()),
        ident: group(3),
        auth_user: group(4),
        timestamp: group(5),
        method: group(6),
        uri: group(7),
        http_version: group(8),
        status: group(9),
        body_length: group(10),
        referer: group(11),
        user_agent: group(12),
        trailing: group(13),
    }
}
