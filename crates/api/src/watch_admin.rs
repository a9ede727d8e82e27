//! `/api/gmail/watch/*` — per-user push watch admin, plus the manual
//! renewal sweep and a list of every currently-watched mailbox.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::ResultWithCode;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Deserialize)]
struct UserIdBody {
    #[serde(rename = "userId")]
    user_id: Uuid,
}

async fn start(
    State(state): State<AppState>,
    Json(body): Json<UserIdBody>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let status = state
        .watch
        .start(body.user_id)
        .await
        .map_err(anyhow::Error::from)
        .log_server_error("failed to start watch")?;

    Ok(Json(json!({
        "success": true,
        "historyId": status.cursor,
        "expiresAt": status.expires_at,
    })))
}

async fn stop(
    State(state): State<AppState>,
    Json(body): Json<UserIdBody>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state
        .watch
        .stop(body.user_id)
        .await
        .map_err(anyhow::Error::from)
        .log_server_error("failed to stop watch")?;

    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    #[serde(rename = "userId")]
    user_id: Option<Uuid>,
}

async fn status(
    State(state): State<AppState>,
    Query(q): Query<StatusQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let Some(user_id) = q.user_id else {
        return Err((StatusCode::BAD_REQUEST, "userId is required".into()));
    };

    let status = state
        .watch
        .status(user_id)
        .await
        .map_err(anyhow::Error::from)
        .log_server_error("failed to read watch status")?;

    Ok(Json(json!({
        "active": status.active,
        "cursor": status.cursor,
        "expiresAt": status.expires_at,
        "humanDelta": status.human_delta,
    })))
}

async fn renew_all(State(state): State<AppState>) -> Result<Json<Value>, (StatusCode, String)> {
    let (renewed, errors) = state
        .watch
        .renew_all()
        .await
        .map_err(anyhow::Error::from)
        .log_server_error("failed to renew watches")?;

    Ok(Json(json!({ "success": true, "renewed": renewed, "errors": errors })))
}

async fn list(State(state): State<AppState>) -> Result<Json<Value>, (StatusCode, String)> {
    let users = store::users::list_connected(&state.pool)
        .await
        .log_server_error("failed to list watched mailboxes")?;

    let now = common::now();
    let watches: Vec<Value> = users
        .into_iter()
        .map(|u| {
            json!({
                "userId": u.id,
                "email": u.email,
                "active": u.watch_active(now),
                "cursor": u.mailbox_cursor,
                "expiresAt": u.watch_expiry,
            })
        })
        .collect();

    Ok(Json(json!({ "count": watches.len(), "watches": watches })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/gmail/watch/start", post(start))
        .route("/api/gmail/watch/stop", post(stop))
        .route("/api/gmail/watch/status", get(status))
        .route("/api/gmail/watch/renew-all", post(renew_all))
        .route("/api/gmail/watch/list", get(list))
}
