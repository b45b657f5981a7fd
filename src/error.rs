//! Error types for the SMS opt-out service.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors talking to the inbound SMS provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    RequestFailed(String),

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),
}

/// Errors talking to the opt-out backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Opt-out request failed: {0}")]
    RequestFailed(String),

    #[error("Opt-out request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Opt-out backend returned unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

/// Pipeline run errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Reply fetch failed: {0}")]
    Fetch(#[from] ProviderError),

    #[error("Opt-out failed for message {message_id}: {source}")]
    Backend {
        message_id: String,
        #[source]
        source: BackendError,
    },

    #[error("Ledger error: {0}")]
    Ledger(#[from] DatabaseError),
}
