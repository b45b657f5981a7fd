//! Shared types for the reply pipeline.

use std::collections::HashSet;

use serde::Serialize;

use crate::store::ReplyStatus;

// ── Batch dedup ─────────────────────────────────────────────────────

/// Phone numbers already resolved by the backend earlier in the current run.
///
/// Created fresh inside each run and dropped with it. Never shared between
/// runs and never persisted.
#[derive(Debug, Default)]
pub struct BatchDedupSet {
    resolved: HashSet<String>,
}

impl BatchDedupSet {
    pub fn contains(&self, phone_number: &str) -> bool {
        self.resolved.contains(phone_number)
    }

    pub fn insert(&mut self, phone_number: &str) {
        self.resolved.insert(phone_number.to_string());
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

// ── Per-message outcome ─────────────────────────────────────────────

/// What happened to one message in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Already in the ledger from an earlier run.
    Skipped,
    /// Ledgered by this run.
    Finalized(ReplyStatus),
    /// Another run ledgered it between our lookup and our write.
    LostRace(ReplyStatus),
}

// ── Run summary ─────────────────────────────────────────────────────

/// Totals for one orchestrator run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Messages returned by the fetch, malformed ones included.
    pub total: usize,
    /// Messages newly ledgered by this run, any status.
    pub processed: usize,
    /// Already ledgered, or ledgered concurrently by another run.
    pub skipped: usize,
    /// Missing id or sender; never ledgered.
    pub malformed: usize,
    /// Backend failures tolerated under `BackendFailurePolicy::Continue`.
    pub failed: usize,
    pub unsubscribed: usize,
    pub user_not_found: usize,
    pub duplicate_stop: usize,
    pub ignored: usize,
}

impl RunSummary {
    pub(crate) fn count(&mut self, outcome: MessageOutcome) {
        match outcome {
            MessageOutcome::Skipped | MessageOutcome::LostRace(_) => self.skipped += 1,
            MessageOutcome::Finalized(status) => {
                self.processed += 1;
                match status {
                    ReplyStatus::Unsubscribed => self.unsubscribed += 1,
                    ReplyStatus::UserNotFound => self.user_not_found += 1,
                    ReplyStatus::DuplicateStop => self.duplicate_stop += 1,
                    ReplyStatus::Ignored => self.ignored += 1,
                }
            }
        }
    }
}
