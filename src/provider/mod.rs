//! Inbound SMS provider — the reply feed the pipeline polls.

pub mod http;
pub mod types;

use async_trait::async_trait;

use crate::error::ProviderError;

pub use http::HttpReplyFetcher;
pub use types::{InboundMessage, MalformedReply, ProviderReply, normalize_phone};

/// Source of inbound replies.
///
/// One call per run returns everything the provider still retains, in the
/// provider's order. Errors abort the run before anything is ledgered.
#[async_trait]
pub trait ReplyFetcher: Send + Sync {
    async fn fetch(&self) -> Result<Vec<ProviderReply>, ProviderError>;
}
