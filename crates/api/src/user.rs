//! `POST /api/user/sync` — upserts the signed-in user's profile, called
//! by the UI's identity layer after every sign-in.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use common::ResultWithCode;
use serde::Deserialize;

use crate::AppState;

#[derive(Debug, Deserialize)]
struct SyncUserRequest {
    email: String,
    name: Option<String>,
    image: Option<String>,
}

async fn sync_user(
    State(state): State<AppState>,
    Json(body): Json<SyncUserRequest>,
) -> Result<Json<models::user::User>, (StatusCode, String)> {
    if body.email.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "email is required".into()));
    }

    let user = store::users::upsert_by_email(
        &state.pool,
        &body.email,
        body.name.as_deref(),
        body.image.as_deref(),
    )
    .await
    .log_server_error("failed to sync user")?;

    Ok(Json(user))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/user/sync", post(sync_user))
}
