//! `GET /api/emails` — lists pending unread messages with supported
//! attachments for the sole connected mailbox, without processing them.
//! Same single-mailbox convenience assumption as `/api/process`.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use common::ResultWithCode;
use models::CoreError;
use serde_json::{json, Value};

use crate::AppState;

const LIST_LIMIT: usize = 10;

async fn list_emails(
    State(state): State<AppState>,
) -> Result<Json<Value>, (axum::http::StatusCode, String)> {
    let user = store::users::first_connected(&state.pool)
        .await
        .log_server_error("failed to look up connected mailbox")?;

    let Some(user) = user else {
        return Ok(Json(json!({ "success": true, "count": 0, "emails": [] })));
    };

    let emails = fetch_unread(&state, user.id)
        .await
        .map_err(anyhow::Error::from)
        .log_server_error("failed to list unread messages")?;

    Ok(Json(json!({
        "success": true,
        "count": emails.len(),
        "emails": emails,
    })))
}

async fn fetch_unread(
    state: &AppState,
    user_id: uuid::Uuid,
) -> Result<Vec<models::mailbox::MessageSummary>, CoreError> {
    let provider = state.clients.client_for(user_id).await?;
    provider.list_unread_with_attachments(LIST_LIMIT).await
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/emails", get(list_emails))
}
