//! Wire and domain types for inbound replies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ── Wire format ─────────────────────────────────────────────────────

/// A reply exactly as the provider reports it.
///
/// Every field is optional on the wire; `InboundMessage::from_reply` decides
/// what is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderReply {
    /// Provider message id. Some providers send numbers, some strings.
    #[serde(default, deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    /// Sender number, possibly without the leading `+`.
    #[serde(default)]
    pub user_number: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

// ── Domain message ──────────────────────────────────────────────────

/// A validated inbound reply, ready for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub id: String,
    /// Normalized sender number, always `+`-prefixed.
    pub phone_number: String,
    /// Raw message text.
    pub content: String,
    pub received_at: DateTime<Utc>,
}

/// Why a provider reply could not become an `InboundMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReply {
    MissingId,
    MissingSender,
}

impl MalformedReply {
    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingId => "missing id",
            Self::MissingSender => "missing sender number",
        }
    }
}

impl InboundMessage {
    /// Validate a provider reply. `fetched_at` stands in for a missing timestamp.
    pub fn from_reply(
        reply: ProviderReply,
        fetched_at: DateTime<Utc>,
    ) -> Result<Self, MalformedReply> {
        let id = reply
            .id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(MalformedReply::MissingId)?;

        let phone_number = reply
            .user_number
            .as_deref()
            .map(normalize_phone)
            .filter(|p| p.len() > 1)
            .ok_or(MalformedReply::MissingSender)?;

        Ok(Self {
            id,
            phone_number,
            content: reply.content.unwrap_or_default(),
            received_at: reply.created_at.unwrap_or(fetched_at),
        })
    }
}

/// Normalize a sender number: trim, then ensure a leading `+`.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('+') {
        trimmed.to_string()
    } else {
        format!("+{trimmed}")
    }
}
