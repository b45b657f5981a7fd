//! libSQL backend — async `ReplyLedger` implementation.
//!
//! Supports local file and in-memory databases. The `message_id` primary key
//! is what keeps concurrent runs (or concurrent processes sharing the file)
//! from ledgering the same reply twice.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    RecordFilter, RecordOutcome, ReplyAuditRecord, ReplyLedger, ReplyStatus,
};

/// Hard ceiling on rows returned by `list_records`.
pub const MAX_LIST_LIMIT: usize = 500;

/// libSQL ledger backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Ledger database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map(|ndt| ndt.and_utc())
        .map_err(|e| DatabaseError::Serialization(format!("bad timestamp '{s}': {e}")))
}

/// Map a libsql Row to a ReplyAuditRecord.
///
/// Column order matches RECORD_COLUMNS.
fn row_to_record(row: &libsql::Row) -> Result<ReplyAuditRecord, DatabaseError> {
    let get_text = |idx: i32| -> Result<String, DatabaseError> {
        row.get::<String>(idx)
            .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))
    };

    let status_str = get_text(4)?;
    Ok(ReplyAuditRecord {
        message_id: get_text(0)?,
        phone_number: get_text(1)?,
        content: get_text(2)?,
        received_at: parse_datetime(&get_text(3)?)?,
        status: status_str
            .parse::<ReplyStatus>()
            .map_err(DatabaseError::Serialization)?,
        processed_at: parse_datetime(&get_text(5)?)?,
    })
}

// ── Trait implementation ────────────────────────────────────────────

const RECORD_COLUMNS: &str =
    "message_id, phone_number, content, received_at, status, processed_at";

#[async_trait]
impl ReplyLedger for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn is_ledgered(&self, message_id: &str) -> Result<bool, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT 1 FROM sms_reply_audit WHERE message_id = ?1 LIMIT 1",
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("is_ledgered: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("is_ledgered: {e}")))?;
        Ok(row.is_some())
    }

    async fn record(&self, record: &ReplyAuditRecord) -> Result<RecordOutcome, DatabaseError> {
        let changed = self
            .conn()
            .execute(
                &format!(
                    "INSERT INTO sms_reply_audit ({RECORD_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(message_id) DO NOTHING"
                ),
                params![
                    record.message_id.as_str(),
                    record.phone_number.as_str(),
                    record.content.as_str(),
                    format_datetime(&record.received_at),
                    record.status.as_str(),
                    format_datetime(&record.processed_at),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record: {e}")))?;

        if changed == 0 {
            debug!(message_id = %record.message_id, "Reply already ledgered");
            return Ok(RecordOutcome::AlreadyLedgered);
        }

        debug!(
            message_id = %record.message_id,
            status = %record.status,
            "Reply ledgered"
        );
        Ok(RecordOutcome::Inserted)
    }

    async fn get_record(
        &self,
        message_id: &str,
    ) -> Result<Option<ReplyAuditRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RECORD_COLUMNS} FROM sms_reply_audit WHERE message_id = ?1"),
                params![message_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_record: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_record: {e}"))),
        }
    }

    async fn list_records(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<ReplyAuditRecord>, DatabaseError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<libsql::Value> = Vec::new();

        if let Some(phone) = &filter.phone_number {
            values.push(libsql::Value::Text(phone.clone()));
            conditions.push(format!("phone_number = ?{}", values.len()));
        }
        if let Some(status) = filter.status {
            values.push(libsql::Value::Text(status.as_str().to_string()));
            conditions.push(format!("status = ?{}", values.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit = filter.limit.clamp(1, MAX_LIST_LIMIT) as i64;
        values.push(libsql::Value::Integer(limit));
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM sms_reply_audit {where_clause}
             ORDER BY processed_at DESC, message_id ASC LIMIT ?{}",
            values.len()
        );

        let mut rows = self
            .conn()
            .query(&sql, values)
            .await
            .map_err(|e| DatabaseError::Query(format!("list_records: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_records: {e}")))?
        {
            records.push(row_to_record(&row)?);
        }
        Ok(records)
    }
}
