//! Operator API (C12): health, watch admin, queue stats, manual
//! re-process, plus the thin OAuth/webhook glue the other external
//! collaborators (§6) need. Routes are grouped into one module per
//! resource and merged here, the same shape `liblaas::web` nests its
//! `booking`/`flavor`/`user` route groups under one `Router`.

mod documents;
mod emails;
mod health;
mod metrics_mw;
mod oauth;
mod process;
mod queues;
mod user;
mod watch_admin;
mod webhook;

use std::sync::Arc;

use axum::middleware;
use axum::Router;
use mailboxclient::ClientSource;
use pipeline::{AttachmentWorker, SyncWorker};
use queue::Queue;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use watch::WatchManager;

/// Everything an HTTP handler needs. Cloned per-request by axum's
/// `State` extractor — every field is itself cheap to clone (pool,
/// reqwest client, Arc'd workers).
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub queue: Queue,
    pub clients: Arc<dyn ClientSource>,
    pub watch: Arc<WatchManager>,
    pub sync_worker: Arc<SyncWorker>,
    pub attachments: Arc<AttachmentWorker>,
    pub use_queue: bool,
    pub gmail_client_id: String,
    pub gmail_client_secret: String,
    pub gmail_redirect_uri: String,
    pub frontend_url: String,
    pub pubsub_topic: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(webhook::routes())
        .merge(process::routes())
        .merge(emails::routes())
        .merge(documents::routes())
        .merge(user::routes())
        .merge(oauth::routes())
        .merge(watch_admin::routes())
        .merge(queues::routes())
        .route_layer(middleware::from_fn(metrics_mw::track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
