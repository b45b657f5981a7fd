//! REST client for the provider's inbound-reply feed.

use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::debug;

use super::ReplyFetcher;
use super::types::ProviderReply;
use crate::config::ProviderConfig;
use crate::error::ProviderError;

/// The feed is either a bare array or wrapped in `{"messages": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeedBody {
    List(Vec<ProviderReply>),
    Wrapped { messages: Vec<ProviderReply> },
}

impl FeedBody {
    fn into_replies(self) -> Vec<ProviderReply> {
        match self {
            Self::List(replies) | Self::Wrapped { messages: replies } => replies,
        }
    }
}

/// Fetches replies with `GET {base_url}/replies` using basic auth.
pub struct HttpReplyFetcher {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl HttpReplyFetcher {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::RequestFailed(format!("Failed to build client: {e}")))?;
        Ok(Self { config, client })
    }

    fn feed_url(&self) -> String {
        format!("{}/replies", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ReplyFetcher for HttpReplyFetcher {
    async fn fetch(&self) -> Result<Vec<ProviderReply>, ProviderError> {
        let resp = self
            .client
            .get(self.feed_url())
            .basic_auth(
                &self.config.username,
                Some(self.config.api_key.expose_secret()),
            )
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: FeedBody = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let replies = body.into_replies();

        debug!(count = replies.len(), "Fetched inbound replies");
        Ok(replies)
    }
}
