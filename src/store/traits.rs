//! `ReplyLedger` trait: the durable, append-only record of handled replies.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

/// Terminal outcome of one inbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    /// Backend confirmed the opt-out.
    Unsubscribed,
    /// Backend had no user for the number.
    UserNotFound,
    /// Same number already resolved earlier in the batch.
    DuplicateStop,
    /// Not a STOP message.
    Ignored,
}

impl ReplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsubscribed => "unsubscribed",
            Self::UserNotFound => "user_not_found",
            Self::DuplicateStop => "duplicate_stop",
            Self::Ignored => "ignored",
        }
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReplyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unsubscribed" => Ok(Self::Unsubscribed),
            "user_not_found" => Ok(Self::UserNotFound),
            "duplicate_stop" => Ok(Self::DuplicateStop),
            "ignored" => Ok(Self::Ignored),
            other => Err(format!("unknown reply status: {other}")),
        }
    }
}

/// One ledger entry. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyAuditRecord {
    pub message_id: String,
    pub phone_number: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
    pub status: ReplyStatus,
    pub processed_at: DateTime<Utc>,
}

/// Result of a ledger write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// This call created the record.
    Inserted,
    /// A record for the message id already existed; nothing was written.
    AlreadyLedgered,
}

/// Filter for operational ledger queries.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    pub phone_number: Option<String>,
    pub status: Option<ReplyStatus>,
    pub limit: usize,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            phone_number: None,
            status: None,
            limit: 50,
        }
    }
}

/// Backend-agnostic ledger.
///
/// `message_id` is unique for the lifetime of the store. Records are never
/// updated or deleted.
#[async_trait]
pub trait ReplyLedger: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    /// Whether a record exists for this message id, under any status.
    async fn is_ledgered(&self, message_id: &str) -> Result<bool, DatabaseError>;

    /// Write a record unless one already exists for its message id.
    ///
    /// Losing a uniqueness race is `Ok(RecordOutcome::AlreadyLedgered)`, not an error.
    async fn record(&self, record: &ReplyAuditRecord) -> Result<RecordOutcome, DatabaseError>;

    /// Look up a single record.
    async fn get_record(&self, message_id: &str)
    -> Result<Option<ReplyAuditRecord>, DatabaseError>;

    /// List records, most recently processed first.
    async fn list_records(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<ReplyAuditRecord>, DatabaseError>;
}
