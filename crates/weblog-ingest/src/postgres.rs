//! PostgreSQL sink for access log records
//!
//! Each batch is inserted with one multi-row `INSERT` inside its own
//! transaction, so a rejected row rolls back the whole batch. Records are
//! checked against the column types first; a record that cannot be stored
//! fails its batch with [`SinkError::Validation`] before any SQL is sent.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{debug, info};
use weblog_common::LogRecord;

use crate::config::DbConfig;
use crate::error::{IngestError, SinkError};
use crate::sink::RecordSink;

/// Table created by the bundled migrations
pub const TABLE: &str = "access_logs";

// 11 bind parameters per row; keep well below the 65535 limit
const MAX_ROWS_PER_STATEMENT: usize = 5000;

/// Connect a pool using `config`
pub async fn create_pool(config: &DbConfig) -> Result<PgPool, IngestError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .connect(&config.url)
        .await
        .map_err(|e| IngestError::Config(format!("Failed to connect to database: {e}")))?;

    info!(max_connections = config.max_connections, "Database pool created");
    Ok(pool)
}

/// Apply the bundled schema migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), IngestError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| IngestError::Config(format!("Failed to run migrations: {e}")))?;
    Ok(())
}

/// Bulk-inserts records into the `access_logs` table
#[derive(Debug, Clone)]
pub struct PgRecordSink {
    pool: PgPool,
}

impl PgRecordSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Check one record against the table and return its `body_length` column
fn checked_body_length(record: &LogRecord) -> Result<i64, SinkError> {
    record
        .check_columns()
        .map_err(|e| SinkError::Validation(format!("{record}: {e}")))?;

    i64::try_from(record.body_length).map_err(|_| {
        SinkError::Validation(format!(
            "body_length {} out of range for {}",
            record.body_length, record
        ))
    })
}

#[async_trait]
impl RecordSink for PgRecordSink {
    async fn bulk_insert(&self, records: &[LogRecord]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }

        let body_lengths = records
            .iter()
            .map(checked_body_length)
            .collect::<Result<Vec<i64>, SinkError>>()?;

        let mut tx = self.pool.begin().await?;

        for (chunk_index, chunk) in records.chunks(MAX_ROWS_PER_STATEMENT).enumerate() {
            let offset = chunk_index * MAX_ROWS_PER_STATEMENT;
            let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {TABLE} (ip_address, additional_ip_info, date, method, uri, \
                 http_version, status, body_length, referer_from, user_agent) "
            ));

            query_builder.push_values(chunk.iter().enumerate(), |mut b, (i, record)| {
                b.push_bind(&record.ip_address)
                    .push_unseparated("::inet")
                    .push_bind(&record.additional_ip_info)
                    .push_bind(record.date.with_timezone(&Utc))
                    .push_bind(&record.method)
                    .push_bind(&record.uri)
                    .push_bind(&record.http_version)
                    .push_bind(i32::from(record.status))
                    .push_bind(body_lengths[offset + i])
                    .push_bind(&record.referer_from)
                    .push_bind(&record.user_agent);
            });

            query_builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        debug!(rows = records.len(), table = TABLE, "Inserted access log batch");
        Ok(())
    }
}
