//! Stub collaborators shared by pipeline tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::backend::{OptOutClient, OptOutResult};
use crate::error::{BackendError, ProviderError};
use crate::provider::{ProviderReply, ReplyFetcher};

pub(crate) fn reply(id: &str, number: &str, content: &str) -> ProviderReply {
    ProviderReply {
        id: Some(id.to_string()),
        user_number: Some(number.to_string()),
        content: Some(content.to_string()),
        created_at: Some(Utc::now()),
    }
}

/// Returns whatever feed is currently loaded, or a provider error when empty.
pub(crate) struct StubFetcher {
    feed: Mutex<Option<Vec<ProviderReply>>>,
    fetches: AtomicUsize,
}

impl StubFetcher {
    pub(crate) fn new(feed: Vec<ProviderReply>) -> Arc<Self> {
        Arc::new(Self {
            feed: Mutex::new(Some(feed)),
            fetches: AtomicUsize::new(0),
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            feed: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        })
    }

    pub(crate) fn set(&self, feed: Vec<ProviderReply>) {
        *self.feed.lock().unwrap() = Some(feed);
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplyFetcher for StubFetcher {
    async fn fetch(&self) -> Result<Vec<ProviderReply>, ProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.feed
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ProviderError::RequestFailed("connection reset".into()))
    }
}

/// Answers with an HTTP-like status per phone number and records every call.
/// Status `0` stands for a connection that never got a response.
pub(crate) struct StubBackend {
    default_status: Mutex<u16>,
    overrides: Mutex<HashMap<String, u16>>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl StubBackend {
    pub(crate) fn answering(status: u16) -> Arc<Self> {
        Self::slow(status, Duration::ZERO)
    }

    pub(crate) fn slow(status: u16, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            default_status: Mutex::new(status),
            overrides: Mutex::new(HashMap::new()),
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn answer_for(&self, phone: &str, status: u16) {
        self.overrides
            .lock()
            .unwrap()
            .insert(phone.to_string(), status);
    }

    pub(crate) fn set_default(&self, status: u16) {
        *self.default_status.lock().unwrap() = status;
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OptOutClient for StubBackend {
    async fn opt_out(&self, phone_number: &str) -> Result<OptOutResult, BackendError> {
        self.calls.lock().unwrap().push(phone_number.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let status = {
            let overrides = self.overrides.lock().unwrap();
            overrides
                .get(phone_number)
                .copied()
                .unwrap_or(*self.default_status.lock().unwrap())
        };
        match status {
            200 => Ok(OptOutResult::Unsubscribed),
            404 => Ok(OptOutResult::UserNotFound),
            0 => Err(BackendError::RequestFailed("connection refused".into())),
            other => Err(BackendError::UnexpectedStatus {
                status: other,
                body: "boom".into(),
            }),
        }
    }
}
