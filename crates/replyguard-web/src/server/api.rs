//! REST API endpoints — ingestion plus a read-only conversation listing.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use replyguard_core::ingest::{CustomerMessage, IngestError, StaffReply};

use super::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/customer_message", post(post_customer_message))
        .route("/staff_reply", post(post_staff_reply))
        .route("/api/conversations", get(list_conversations))
        .route("/api/conversations/{conversation_id}", get(get_conversation))
}

fn ack(result: Result<(), IngestError>) -> (StatusCode, Json<Value>) {
    match result {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"status": "error", "error": e.to_string()})),
        ),
    }
}

/// Unparseable bodies get the same JSON error shape as validation failures.
fn rejected(rejection: JsonRejection) -> (StatusCode, Json<Value>) {
    (
        rejection.status(),
        Json(json!({"status": "error", "error": rejection.body_text()})),
    )
}

// --- Ingestion ---

async fn post_customer_message(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CustomerMessage>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    match body {
        Ok(Json(body)) => ack(state.ingestor.customer_message(&body).await),
        Err(rejection) => rejected(rejection),
    }
}

async fn post_staff_reply(
    State(state): State<Arc<AppState>>,
    body: Result<Json<StaffReply>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    match body {
        Ok(Json(body)) => ack(state.ingestor.staff_reply(&body).await),
        Err(rejection) => rejected(rejection),
    }
}

// --- Status ---

async fn list_conversations(State(state): State<Arc<AppState>>) -> Json<Value> {
    let now = state.clock.now();
    Json(json!(state.store.summaries(now).await))
}

async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let now = state.clock.now();
    match state.store.get(&conversation_id).await {
        Some(convo) => (StatusCode::OK, Json(json!(convo.summary(now)))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("conversation '{}' not found", conversation_id)})),
        ),
    }
}
