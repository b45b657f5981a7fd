//! Inbound SMS reply pipeline.
//!
//! Every poll flows through:
//! 1. `ReplyFetcher::fetch()`: provider feed, one call per run
//! 2. `ReplyLedger::is_ledgered()`: skip anything handled in an earlier run
//! 3. `classify()`: STOP vs everything else
//! 4. `OptOutClient::opt_out()`: once per number per run
//! 5. `ReplyLedger::record()`: exactly one record per message id, ever

pub mod classifier;
pub mod poller;
pub mod processor;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use classifier::{ReplyIntent, classify};
pub use poller::{PollerHandle, spawn_reply_poller};
pub use processor::ReplyProcessor;
pub use types::{BatchDedupSet, MessageOutcome, RunSummary};
