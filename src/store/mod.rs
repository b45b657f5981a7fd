//! Persistence layer for the reply ledger (libSQL).

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{RecordFilter, RecordOutcome, ReplyAuditRecord, ReplyLedger, ReplyStatus};
