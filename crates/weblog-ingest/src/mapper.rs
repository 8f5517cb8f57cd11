//! Conversion of parsed fields into [`LogRecord`]s

use chrono::DateTime;
use tracing::warn;
use weblog_common::LogRecord;

use crate::error::MapError;
use crate::parser::LogFields;

/// Default timestamp layout of access logs, e.g. `17/May/2015:10:05:03 +0000`
pub const DEFAULT_DATE_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Placeholder NCSA logs use for absent values
const ABSENT: &str = "-";

/// Result of mapping one matched line
#[derive(Debug)]
pub enum MapOutcome {
    Mapped(LogRecord),
    MapFailed(MapError),
}

impl MapOutcome {
    pub fn into_record(self) -> Option<LogRecord> {
        match self {
            MapOutcome::Mapped(record) => Some(record),
            MapOutcome::MapFailed(_) => None,
        }
    }
}

/// Maps parsed access log fields to records
#[derive(Debug, Clone)]
pub struct RecordMapper {
    date_format: String,
}

impl Default for RecordMapper {
    fn default() -> Self {
        Self::new(DEFAULT_DATE_FORMAT)
    }
}

impl RecordMapper {
    pub fn new(date_format: impl Into<String>) -> Self {
        Self {
            date_format: date_format.into(),
        }
    }

    /// Convert `fields` into a record
    ///
    /// Failures are logged here and returned as [`MapOutcome::MapFailed`];
    /// they are never propagated as errors.
    pub fn map(&self, fields: &LogFields) -> MapOutcome {
        match self.try_map(fields) {
            Ok(record) => MapOutcome::Mapped(record),
            Err(e) => {
                warn!(
                    error = %e,
                    ip_address = %fields.ip_address,
                    timestamp = %fields.timestamp,
                    uri = %fields.uri,
                    "Failed to map access log line to record"
                );
                MapOutcome::MapFailed(e)
            },
        }
    }

    fn try_map(&self, fields: &LogFields) -> Result<LogRecord, MapError> {
        let date = DateTime::parse_from_str(&fields.timestamp, &self.date_format).map_err(
            |source| MapError::InvalidDate {
                value: fields.timestamp.clone(),
                source,
            },
        )?;

        let body_length = if fields.body_length == ABSENT {
            0
        } else {
            fields
                .body_length
                .parse::<u64>()
                .map_err(|source| MapError::InvalidBodyLength {
                    value: fields.body_length.clone(),
                    source,
                })?
        };

        let status = fields
            .status
            .parse::<u16>()
            .map_err(|source| MapError::InvalidStatus {
                value: fields.status.clone(),
                source,
            })?;

        let record = LogRecord::builder()
            .ip_address(fields.ip_address.as_str())
            .additional_ip_info(fields.additional_ip_info.clone())
            .date(date)
            .method(fields.method.as_str())
            .uri(fields.uri.as_str())
            .http_version(fields.http_version.as_str())
            .status(status)
            .body_length(body_length)
            .referer_from(optional_header(&fields.referer))
            .user_agent(optional_header(&fields.user_agent))
            .build()?;

        Ok(record)
    }
}

/// `-` and empty header values both mean "not sent"
fn optional_header(value: &str) -> Option<String> {
    if value.is_empty() || value == ABSENT {
        None
    } else {
        Some(value.to_string())
    }
}
