//! HTTP endpoints: manual trigger, ledger lookups, health.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::pipeline::ReplyProcessor;
use crate::provider::normalize_phone;
use crate::store::{RecordFilter, ReplyStatus};

/// Shared state for the reply routes.
#[derive(Clone)]
pub struct ReplyRouteState {
    pub processor: Arc<ReplyProcessor>,
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "sms-optout"
    }))
}

// ── Manual trigger ──────────────────────────────────────────────────

/// GET /process-sms-replies
///
/// Runs the pipeline and waits for it. Waits for any scheduled run in
/// progress to finish first. The run is a detached task: a client that
/// disconnects does not cancel it between an opt-out and its ledger write.
async fn process_sms_replies(State(state): State<ReplyRouteState>) -> Response {
    let processor = Arc::clone(&state.processor);
    let outcome = tokio::spawn(async move { processor.run().await }).await;

    match outcome {
        Ok(Ok(summary)) => Json(serde_json::json!({
            "success": true,
            "total": summary.total,
            "processed": summary.processed,
        }))
        .into_response(),
        Ok(Err(e)) => {
            error!(error = %e, "Manual SMS reply run failed");
            run_failed()
        }
        Err(e) => {
            error!(error = %e, "Manual SMS reply run panicked");
            run_failed()
        }
    }
}

fn run_failed() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "statusCode": 500,
            "error": "Internal Server Error",
            "message": "Failed to process SMS replies",
        })),
    )
        .into_response()
}

// ── Ledger queries ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListRepliesQuery {
    phone: Option<String>,
    status: Option<String>,
    limit: Option<usize>,
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn ledger_unavailable() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "Ledger query failed" })),
    )
        .into_response()
}

/// GET /api/replies?phone=&status=&limit=
async fn list_replies(
    State(state): State<ReplyRouteState>,
    Query(query): Query<ListRepliesQuery>,
) -> Response {
    let status = match query.status.as_deref().map(str::parse::<ReplyStatus>) {
        Some(Ok(status)) => Some(status),
        Some(Err(e)) => return bad_request(e),
        None => None,
    };

    let filter = RecordFilter {
        phone_number: query
            .phone
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(normalize_phone),
        status,
        limit: query.limit.unwrap_or(RecordFilter::default().limit),
    };

    match state.processor.ledger().list_records(&filter).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list ledger records");
            ledger_unavailable()
        }
    }
}

/// GET /api/replies/{message_id}
async fn get_reply(
    State(state): State<ReplyRouteState>,
    Path(message_id): Path<String>,
) -> Response {
    match state.processor.ledger().get_record(&message_id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "No ledger record for this message" })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, message_id = %message_id, "Failed to load ledger record");
            ledger_unavailable()
        }
    }
}

/// Build the service router.
pub fn reply_routes(state: ReplyRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/process-sms-replies", get(process_sms_replies))
        .route("/api/replies", get(list_replies))
        .route("/api/replies/{message_id}", get(get_reply))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
