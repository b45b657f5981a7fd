//! Opt-out backend client.
//!
//! `POST {base_url}/opt-out-alert` with `{"phoneNumber": "+44..."}`.
//! Only two answers are terminal: 200 (unsubscribed) and 404 (no such user).
//! Everything else, timeouts included, is a failure and nothing gets ledgered.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::BackendConfig;
use crate::error::BackendError;

/// Terminal answer from the backend for one phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptOutResult {
    Unsubscribed,
    UserNotFound,
}

/// Something that can opt a phone number out.
#[async_trait]
pub trait OptOutClient: Send + Sync {
    /// `phone_number` is already normalized.
    async fn opt_out(&self, phone_number: &str) -> Result<OptOutResult, BackendError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OptOutRequest<'a> {
    phone_number: &'a str,
}

/// HTTP implementation against the real backend.
pub struct HttpOptOutClient {
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpOptOutClient {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::RequestFailed(format!("Failed to build client: {e}")))?;
        Ok(Self {
            endpoint: format!("{}/opt-out-alert", config.base_url.trim_end_matches('/')),
            timeout: config.timeout,
            client,
        })
    }

    /// One request/response exchange, body included.
    async fn call(&self, phone_number: &str) -> Result<OptOutResult, BackendError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&OptOutRequest { phone_number })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        match resp.status() {
            StatusCode::OK => {
                debug!(phone = %phone_number, "Backend confirmed opt-out");
                Ok(OptOutResult::Unsubscribed)
            }
            StatusCode::NOT_FOUND => {
                warn!(phone = %phone_number, "Backend has no user for this number");
                Ok(OptOutResult::UserNotFound)
            }
            status => {
                let body = resp.text().await.map_err(|e| self.transport_error(e))?;
                Err(BackendError::UnexpectedStatus {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout {
                timeout: self.timeout,
            }
        } else {
            BackendError::RequestFailed(e.to_string())
        }
    }
}

#[async_trait]
impl OptOutClient for HttpOptOutClient {
    async fn opt_out(&self, phone_number: &str) -> Result<OptOutResult, BackendError> {
        tokio::time::timeout(self.timeout, self.call(phone_number))
            .await
            .map_err(|_| BackendError::Timeout {
                timeout: self.timeout,
            })?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::post;
    use axum::{Json, Router};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    #[derive(Clone)]
    struct StubBackend {
        status: u16,
        delay: Duration,
        seen: Arc<Mutex<Vec<serde_json::Value>>>,
    }

    async fn opt_out_alert(
        State(stub): State<StubBackend>,
        Json(body): Json<serde_json::Value>,
    ) -> AxumStatus {
        stub.seen.lock().unwrap().push(body);
        tokio::time::sleep(stub.delay).await;
        AxumStatus::from_u16(stub.status).unwrap()
    }

    fn client_for(base_url: String) -> HttpOptOutClient {
        HttpOptOutClient::new(&BackendConfig {
            base_url,
            timeout: Duration::from_millis(300),
        })
        .unwrap()
    }

    async fn start_backend(status: u16, delay: Duration) -> (HttpOptOutClient, StubBackend) {
        let stub = StubBackend {
            status,
            delay,
            seen: Arc::new(Mutex::new(Vec::new())),
        };
        let app = Router::new()
            .route("/opt-out-alert", post(opt_out_alert))
            .with_state(stub.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (client_for(format!("http://{addr}/")), stub)
    }

    #[tokio::test]
    async fn ok_maps_to_unsubscribed_and_sends_phone() {
        let (client, stub) = start_backend(200, Duration::ZERO).await;

        let result = client.opt_out("+447700900123").await.unwrap();

        assert_eq!(result, OptOutResult::Unsubscribed);
        let seen = stub.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], serde_json::json!({"phoneNumber": "+447700900123"}));
    }

    #[tokio::test]
    async fn not_found_maps_to_user_not_found() {
        let (client, _stub) = start_backend(404, Duration::ZERO).await;
        let result = client.opt_out("+447700900123").await.unwrap();
        assert_eq!(result, OptOutResult::UserNotFound);
    }

    #[tokio::test]
    async fn other_statuses_are_failures() {
        for status in [500u16, 201, 400, 503] {
            let (client, _stub) = start_backend(status, Duration::ZERO).await;
            let err = client.opt_out("+447700900123").await.unwrap_err();
            assert!(
                matches!(err, BackendError::UnexpectedStatus { status: s, .. } if s == status),
                "status {status} gave {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let (client, _stub) = start_backend(200, Duration::from_secs(3)).await;
        let err = client.opt_out("+447700900123").await.unwrap_err();
        assert!(matches!(err, BackendError::Timeout { .. }));
    }

    #[tokio::test]
    async fn stalled_error_body_times_out() {
        // Status line and headers arrive, then the body never finishes.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket
                .write_all(
                    b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 100\r\n\r\npartial",
                )
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = client_for(format!("http://{addr}"));
        let err = tokio::time::timeout(Duration::from_secs(2), client.opt_out("+447700900123"))
            .await
            .expect("opt-out call hung on the response body")
            .unwrap_err();
        assert!(matches!(err, BackendError::Timeout { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn unreachable_backend_is_request_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(format!("http://{addr}"))
            .opt_out("+447700900123")
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::RequestFailed(_)), "got {err:?}");
    }
}
