//! `POST /api/process` — synchronous sync+extract of one mailbox, for
//! operator-triggered runs outside the push/queue path.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use common::ResultWithCode;
use pipeline::process_mailbox;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct ProcessRequest {
    #[serde(rename = "userId")]
    user_id: Option<Uuid>,
}

async fn process(
    State(state): State<AppState>,
    body: Option<Json<ProcessRequest>>,
) -> Result<Json<Value>, (axum::http::StatusCode, String)> {
    let user_id = body.and_then(|Json(b)| b.user_id);

    let summary = process_mailbox(&state.pool, &state.clients, &state.attachments, user_id)
        .await
        .map_err(anyhow::Error::from)
        .log_server_error("failed to process mailbox")?;

    Ok(Json(json!({
        "emailsProcessed": summary.emails_processed,
        "documentsProcessed": summary.documents_processed,
        "successful": summary.successful,
        "failed": summary.failed,
        "results": summary.results.iter().map(|r| json!({
            "fileName": r.file_name,
            "documentId": r.document_id,
            "error": r.error,
            "duration": r.duration_ms,
        })).collect::<Vec<_>>(),
    })))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/process", post(process))
}
