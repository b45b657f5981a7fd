//! Orchestrates one poll of the provider feed.
//!
//! **Core invariant: at most one ledger record, and at most one opt-out
//! call per run, for any reply.**
//!
//! Flow per message, strictly in provider order:
//! 1. Ledger lookup → skip if already handled in an earlier run
//! 2. Classify content → non-STOP is ledgered as `ignored`
//! 3. STOP → batch dedup, else backend opt-out (200 / 404 are terminal)
//! 4. Ledger write, tolerating a concurrent writer

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::backend::{OptOutClient, OptOutResult};
use crate::config::BackendFailurePolicy;
use crate::error::PipelineError;
use crate::pipeline::classifier::{ReplyIntent, classify};
use crate::pipeline::types::{BatchDedupSet, MessageOutcome, RunSummary};
use crate::provider::{InboundMessage, ReplyFetcher};
use crate::store::{RecordOutcome, ReplyAuditRecord, ReplyLedger, ReplyStatus};

/// Orchestrates fetch → dedup → classify → opt-out → ledger.
///
/// Built once per process and shared by the poll scheduler and the manual
/// trigger. Runs are serialized by an internal lock; the ledger's unique key
/// covers anything running outside this process.
pub struct ReplyProcessor {
    fetcher: Arc<dyn ReplyFetcher>,
    backend: Arc<dyn OptOutClient>,
    ledger: Arc<dyn ReplyLedger>,
    on_backend_failure: BackendFailurePolicy,
    run_lock: Mutex<()>,
}

impl ReplyProcessor {
    pub fn new(
        fetcher: Arc<dyn ReplyFetcher>,
        backend: Arc<dyn OptOutClient>,
        ledger: Arc<dyn ReplyLedger>,
    ) -> Self {
        Self {
            fetcher,
            backend,
            ledger,
            on_backend_failure: BackendFailurePolicy::default(),
            run_lock: Mutex::new(()),
        }
    }

    pub fn with_failure_policy(mut self, policy: BackendFailurePolicy) -> Self {
        self.on_backend_failure = policy;
        self
    }

    /// The ledger this processor writes to.
    pub fn ledger(&self) -> &Arc<dyn ReplyLedger> {
        &self.ledger
    }

    /// Poll the provider once and handle every reply it returns.
    ///
    /// A fetch error aborts before anything is written. A backend error
    /// aborts the rest of the batch under `BackendFailurePolicy::Abort`;
    /// messages finalized before it stay ledgered.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let run_id = Uuid::new_v4();
        self.run_batch()
            .instrument(info_span!("sms_reply_run", %run_id))
            .await
    }

    async fn run_batch(&self) -> Result<RunSummary, PipelineError> {
        let _guard = self.run_lock.lock().await;

        let replies = self.fetcher.fetch().await?;
        let fetched_at = Utc::now();

        let mut summary = RunSummary {
            total: replies.len(),
            ..Default::default()
        };
        let mut batch = BatchDedupSet::default();

        info!(total = summary.total, "Processing SMS replies");

        for reply in replies {
            let message = match InboundMessage::from_reply(reply, fetched_at) {
                Ok(message) => message,
                Err(reason) => {
                    warn!(reason = reason.label(), "Skipping malformed provider reply");
                    summary.malformed += 1;
                    continue;
                }
            };

            match self.process_message(&message, &mut batch).await {
                Ok(outcome) => summary.count(outcome),
                Err(e @ PipelineError::Backend { .. })
                    if self.on_backend_failure == BackendFailurePolicy::Continue =>
                {
                    error!(
                        message_id = %message.id,
                        error = %e,
                        "Opt-out failed, leaving reply for the next run"
                    );
                    summary.failed += 1;
                }
                Err(e) => {
                    error!(
                        message_id = %message.id,
                        error = %e,
                        "Aborting SMS reply run"
                    );
                    return Err(e);
                }
            }
        }

        info!(
            total = summary.total,
            processed = summary.processed,
            skipped = summary.skipped,
            malformed = summary.malformed,
            failed = summary.failed,
            "SMS reply run complete"
        );
        Ok(summary)
    }

    /// Take one message to a terminal state.
    async fn process_message(
        &self,
        message: &InboundMessage,
        batch: &mut BatchDedupSet,
    ) -> Result<MessageOutcome, PipelineError> {
        if self.ledger.is_ledgered(&message.id).await? {
            debug!(message_id = %message.id, "Reply already ledgered, skipping");
            return Ok(MessageOutcome::Skipped);
        }

        let status = match classify(&message.content) {
            ReplyIntent::Other => ReplyStatus::Ignored,
            ReplyIntent::Stop => self.handle_stop(message, batch).await?,
        };

        self.finalize(message, status).await
    }

    /// Resolve a STOP reply, calling the backend at most once per number per run.
    async fn handle_stop(
        &self,
        message: &InboundMessage,
        batch: &mut BatchDedupSet,
    ) -> Result<ReplyStatus, PipelineError> {
        if batch.contains(&message.phone_number) {
            info!(
                message_id = %message.id,
                phone = %message.phone_number,
                "Number already handled in this batch"
            );
            return Ok(ReplyStatus::DuplicateStop);
        }

        let result = self
            .backend
            .opt_out(&message.phone_number)
            .await
            .map_err(|source| PipelineError::Backend {
                message_id: message.id.clone(),
                source,
            })?;
        batch.insert(&message.phone_number);

        Ok(match result {
            OptOutResult::Unsubscribed => {
                info!(
                    message_id = %message.id,
                    phone = %message.phone_number,
                    "Unsubscribed number"
                );
                ReplyStatus::Unsubscribed
            }
            OptOutResult::UserNotFound => ReplyStatus::UserNotFound,
        })
    }

    /// Write the ledger record for a terminal status.
    async fn finalize(
        &self,
        message: &InboundMessage,
        status: ReplyStatus,
    ) -> Result<MessageOutcome, PipelineError> {
        let record = audit_record(message, status, Utc::now());

        match self.ledger.record(&record).await? {
            RecordOutcome::Inserted => Ok(MessageOutcome::Finalized(status)),
            RecordOutcome::AlreadyLedgered => {
                warn!(
                    message_id = %message.id,
                    status = %status,
                    "Reply was ledgered concurrently by another run"
                );
                Ok(MessageOutcome::LostRace(status))
            }
        }
    }
}

fn audit_record(
    message: &InboundMessage,
    status: ReplyStatus,
    processed_at: DateTime<Utc>,
) -> ReplyAuditRecord {
    ReplyAuditRecord {
        message_id: message.id.clone(),
        phone_number: message.phone_number.clone(),
        content: message.content.clone(),
        received_at: message.received_at,
        status,
        processed_at,
    }
}
