//! Access-log record types
//!
//! A [`LogRecord`] only ever exists fully populated: it is constructed through
//! [`LogRecordBuilder`], which rejects missing or malformed required fields.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use thiserror::Error;

/// Maximum length of the additional address info column.
pub const MAX_ADDITIONAL_IP_INFO_LEN: usize = 255;

/// Maximum length of the HTTP method column.
pub const MAX_METHOD_LEN: usize = 10;

/// Maximum length of the HTTP version column.
pub const MAX_HTTP_VERSION_LEN: usize = 10;

/// Validation failures raised while building a [`LogRecord`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid IPv4 address: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid HTTP version: {0}")]
    InvalidHttpVersion(String),

    #[error("Field {field} exceeds {max} characters ({actual})")]
    FieldTooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },
}

/// One HTTP request taken from an access log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Client address in dotted-quad form
    pub ip_address: String,

    /// Extra dot-segments that followed the address (e.g. a reverse-DNS tail)
    pub additional_ip_info: Option<String>,

    /// Request time, always offset-aware
    pub date: DateTime<FixedOffset>,

    /// HTTP method (GET, POST, ...)
    pub method: String,

    /// Request URI
    pub uri: String,

    /// Protocol token, e.g. `HTTP/1.1`
    pub http_version: String,

    /// Response status code
    pub status: u16,

    /// Response body size in bytes, `0` when the log had `-`
    pub body_length: u64,

    /// Referer header
    pub referer_from: Option<String>,

    /// User-Agent header
    pub user_agent: Option<String>,
}

impl LogRecord {
    /// Create a builder for a new record
    pub fn builder() -> LogRecordBuilder {
        LogRecordBuilder::default()
    }

    /// Check the record against the `access_logs` column types
    ///
    /// The address must be a canonical IPv4 address and the short text
    /// columns must fit their widths.
    pub fn check_columns(&self) -> Result<(), RecordError> {
        if self.ip_address.parse::<Ipv4Addr>().is_err() {
            return Err(RecordError::InvalidIpAddress(self.ip_address.clone()));
        }

        check_len("method", &self.method, MAX_METHOD_LEN)?;
        check_len("http_version", &self.http_version, MAX_HTTP_VERSION_LEN)?;

        if let Some(ref info) = self.additional_ip_info {
            check_len("additional_ip_info", info, MAX_ADDITIONAL_IP_INFO_LEN)?;
        }

        Ok(())
    }
}

impl std::fmt::Display for LogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {} \"{}\"", self.ip_address, self.method, self.uri)
    }
}

/// Builder for [`LogRecord`]
#[derive(Debug, Default, Clone)]
pub struct LogRecordBuilder {
    ip_address: Option<String>,
    additional_ip_info: Option<String>,
    date: Option<DateTime<FixedOffset>>,
    method: Option<String>,
    uri: Option<String>,
    http_version: Option<String>,
    status: Option<u16>,
    body_length: u64,
    referer_from: Option<String>,
    user_agent: Option<String>,
}

impl LogRecordBuilder {
    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn additional_ip_info(mut self, info: Option<String>) -> Self {
        self.additional_ip_info = info;
        self
    }

    pub fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn http_version(mut self, version: impl Into<String>) -> Self {
        self.http_version = Some(version.into());
        self
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn body_length(mut self, length: u64) -> Self {
        self.body_length = length;
        self
    }

    pub fn referer_from(mut self, referer: Option<String>) -> Self {
        self.referer_from = referer;
        self
    }

    pub fn user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Check required fields and produce the record
    ///
    /// Values are taken as given; column limits are checked separately by
    /// [`LogRecord::check_columns`] where a datastore needs them.
    pub fn build(self) -> Result<LogRecord, RecordError> {
        let ip_address = non_empty(self.ip_address, "ip_address")?;
        let date = self.date.ok_or(RecordError::MissingField("date"))?;
        let method = non_empty(self.method, "method")?;
        let uri = non_empty(self.uri, "uri")?;

        let http_version = non_empty(self.http_version, "http_version")?;
        if !http_version.starts_with("HTTP/") {
            return Err(RecordError::InvalidHttpVersion(http_version));
        }

        let status = self.status.ok_or(RecordError::MissingField("status"))?;

        Ok(LogRecord {
            ip_address,
            additional_ip_info: self.additional_ip_info,
            date,
            method,
            uri,
            http_version,
            status,
            body_length: self.body_length,
            referer_from: self.referer_from,
            user_agent: self.user_agent,
        })
    }
}

fn non_empty(value: Option<String>, field: &'static str) -> Result<String, RecordError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(RecordError::MissingField(field)),
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), RecordError> {
    let actual = value.chars().count();
    if actual > max {
        return Err(RecordError::FieldTooLong { field, max, actual });
    }
    Ok(())
}
