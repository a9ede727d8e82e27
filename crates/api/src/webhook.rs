//! `POST /api/webhook/gmail` — the provider push entrypoint. Always
//! returns 200: a non-200 here just earns a redelivery, and dedup on the
//! enqueue side already makes redelivery free.

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use pipeline::{handle_push, handle_push_direct, PushEnvelope, WebhookOutcome};
use serde_json::{json, Value};
use tracing::warn;

use crate::AppState;

/// Provider's ack window is 10s; budget 1s of margin so a slow enqueue
/// still returns within the window instead of earning a redelivery on
/// top of a success.
const WEBHOOK_BUDGET: Duration = Duration::from_secs(9);

/// Takes the raw body rather than axum's typed `Json<PushEnvelope>`
/// extractor: that extractor rejects unparseable bodies with its own
/// 400/422 before this handler ever runs, which would break the "always
/// 200, ack and ignore anything malformed" contract for a whole class of
/// bad input. Parsing is done by hand here so every outcome, valid or
/// not, reaches the same always-200 response.
async fn webhook_gmail(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    let timer = observability::metrics::WEBHOOK_DURATION_SECONDS
        .with_label_values(&[])
        .start_timer();

    let envelope = match serde_json::from_slice::<PushEnvelope>(&body) {
        Ok(envelope) => Some(envelope),
        Err(e) => {
            warn!(error = ?e, "webhook body was not a valid push envelope, acking anyway");
            None
        }
    };

    let outcome = match &envelope {
        None => Ok(WebhookOutcome::Malformed),
        Some(envelope) if state.use_queue => {
            tokio::time::timeout(WEBHOOK_BUDGET, handle_push(&state.queue, envelope)).await
        }
        Some(envelope) => {
            tokio::time::timeout(
                WEBHOOK_BUDGET,
                handle_push_direct(&state.sync_worker, envelope),
            )
            .await
        }
    };

    timer.observe_duration();

    match outcome {
        Ok(WebhookOutcome::Enqueued { job_id }) => {
            Json(json!({ "status": "queued", "jobId": job_id }))
        }
        Ok(WebhookOutcome::Malformed) => Json(json!({ "status": "queued" })),
        Err(_) => {
            // budget exceeded: the enqueue may still land momentarily, but
            // the provider's ack window has to win — it will redeliver
            Json(json!({ "status": "queued" }))
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/webhook/gmail", post(webhook_gmail))
}
