//! Gmail OAuth: consent URL issuance, code exchange, disconnect. The
//! watch is started automatically once a mailbox is connected, so the UI
//! never has to make a second call to begin receiving push notifications.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::AppState;

const AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const SCOPES: &str = "https://www.googleapis.com/auth/gmail.modify";

#[derive(Debug, Deserialize)]
struct UrlQuery {
    #[serde(rename = "userId")]
    user_id: Option<Uuid>,
}

async fn auth_url(
    State(state): State<AppState>,
    Query(q): Query<UrlQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let Some(user_id) = q.user_id else {
        return Err((StatusCode::BAD_REQUEST, "userId is required".into()));
    };

    let url = url::Url::parse_with_params(
        AUTH_ENDPOINT,
        &[
            ("client_id", state.gmail_client_id.as_str()),
            ("redirect_uri", state.gmail_redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", SCOPES),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", &user_id.to_string()),
        ],
    )
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(json!({ "url": url.as_str() })))
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

async fn callback(State(state): State<AppState>, Query(q): Query<CallbackQuery>) -> Redirect {
    match exchange(&state, q).await {
        Ok(()) => Redirect::to(&format!("{}?gmail=connected", state.frontend_url)),
        Err(reason) => {
            warn!(reason, "gmail oauth callback failed");
            Redirect::to(&format!(
                "{}?gmail=error&reason={}",
                state.frontend_url,
                urlencoding_minimal(&reason)
            ))
        }
    }
}

async fn exchange(state: &AppState, q: CallbackQuery) -> Result<(), String> {
    let code = q.code.ok_or("missing code")?;
    let user_id: Uuid = q
        .state
        .ok_or("missing state")?
        .parse()
        .map_err(|_| "malformed state".to_string())?;

    let http = reqwest::Client::new();
    let resp = http
        .post(TOKEN_ENDPOINT)
        .form(&[
            ("client_id", state.gmail_client_id.as_str()),
            ("client_secret", state.gmail_client_secret.as_str()),
            ("redirect_uri", state.gmail_redirect_uri.as_str()),
            ("code", code.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .map_err(|e| e.to_string())?
        .error_for_status()
        .map_err(|e| e.to_string())?;

    let token: TokenResponse = resp.json().await.map_err(|e| e.to_string())?;
    let refresh_token = token
        .refresh_token
        .ok_or("provider did not return a refresh token")?;

    let sealed_refresh = vault::seal_string(&refresh_token);
    let sealed_access = vault::seal_string(&token.access_token);
    let expiry = Utc::now() + chrono::Duration::seconds(token.expires_in);

    store::users::connect_mailbox(&state.pool, user_id, &sealed_refresh, &sealed_access, expiry)
        .await
        .map_err(|e| e.to_string())?;

    if let Err(e) = state.watch.start(user_id).await {
        // the mailbox is connected either way; the renewal sweep will
        // eventually pick up watch registration on its own
        warn!(error = ?e, %user_id, "failed to auto-start watch after connecting mailbox");
    }

    Ok(())
}

/// Minimal percent-encoding for the handful of characters ever present in
/// an error reason string going into a redirect query param.
fn urlencoding_minimal(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            ' ' => "%20".to_string(),
            '"' => "%22".to_string(),
            '<' => "%3C".to_string(),
            '>' => "%3E".to_string(),
            c => c.to_string(),
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct DisconnectRequest {
    #[serde(rename = "userId")]
    user_id: Uuid,
}

async fn disconnect(
    State(state): State<AppState>,
    Json(body): Json<DisconnectRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if let Err(e) = state.watch.stop(body.user_id).await {
        warn!(error = ?e, user_id = %body.user_id, "failed to stop watch during disconnect");
    }
    store::users::disconnect_mailbox(&state.pool, body.user_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(json!({ "success": true })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/gmail/url", get(auth_url))
        .route("/api/auth/gmail/callback", get(callback))
        .route("/api/auth/gmail/disconnect", post(disconnect))
}
