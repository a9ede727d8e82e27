//! `/api/documents`, `/api/stats` — read and delete access to persisted
//! extraction results.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use common::ResultWithCode;
use models::extraction::ExtractionStatus;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::AppState;

const DEFAULT_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(rename = "userId")]
    user_id: Option<Uuid>,
    status: Option<String>,
    limit: Option<i64>,
}

async fn list_documents(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let status = match q.status.as_deref() {
        Some("completed") => Some(ExtractionStatus::Completed),
        Some("error") => Some(ExtractionStatus::Error),
        _ => None,
    };

    let docs = store::extraction::list_recent(
        &state.pool,
        q.user_id,
        status,
        q.limit.unwrap_or(DEFAULT_LIMIT),
    )
    .await
    .log_server_error("failed to list documents")?;

    Ok(Json(json!(docs)))
}

#[derive(Debug, Deserialize)]
struct StatsQuery {
    #[serde(rename = "userId")]
    user_id: Option<Uuid>,
}

async fn stats(
    State(state): State<AppState>,
    Query(q): Query<StatsQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let stats = store::extraction::stats(&state.pool, q.user_id)
        .await
        .log_server_error("failed to compute stats")?;

    Ok(Json(json!({
        "total": stats.total,
        "completed": stats.completed,
        "errors": stats.errors,
        "avgConfidence": stats.avg_confidence,
    })))
}

async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let deleted = store::extraction::delete_one(&state.pool, id)
        .await
        .log_server_error("failed to delete document")?;

    Ok(Json(json!({
        "success": deleted,
        "message": if deleted { "deleted" } else { "not found" },
    })))
}

#[derive(Debug, Deserialize)]
struct DeleteBatchRequest {
    ids: Vec<Uuid>,
}

async fn delete_batch(
    State(state): State<AppState>,
    Json(body): Json<DeleteBatchRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if body.ids.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "ids must not be empty".into()));
    }

    let deleted_count = store::extraction::delete_many(&state.pool, &body.ids)
        .await
        .log_server_error("failed to delete documents")?;

    Ok(Json(json!({ "success": true, "deletedCount": deleted_count })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/documents", get(list_documents))
        .route("/api/stats", get(stats))
        .route("/api/documents/:id", delete(delete_document))
        .route("/api/documents/delete-batch", post(delete_batch))
}
