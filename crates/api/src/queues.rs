//! `GET /api/queues/stats` — queue depth per job kind, plus which mode
//! (`queue` or `direct`) the webhook path is currently running in.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use common::ResultWithCode;
use serde_json::{json, Value};

use crate::AppState;

async fn stats(State(state): State<AppState>) -> Result<Json<Value>, (StatusCode, String)> {
    let counts = state
        .queue
        .counts()
        .await
        .log_server_error("failed to read queue stats")?;

    let email = counts.get("mailbox_sync").cloned().unwrap_or_default();
    let attachment = counts.get("attachment_extract").cloned().unwrap_or_default();

    Ok(Json(json!({
        "mode": if state.use_queue { "queue" } else { "direct" },
        "queues": {
            "email": {
                "pending": email.pending,
                "active": email.active,
                "completed": email.completed,
                "failed": email.failed,
            },
            "attachment": {
                "pending": attachment.pending,
                "active": attachment.active,
                "completed": attachment.completed,
                "failed": attachment.failed,
            },
        },
    })))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/queues/stats", get(stats))
}
