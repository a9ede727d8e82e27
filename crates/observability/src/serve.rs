use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use tracing::info;

use crate::metrics::REGISTRY;

async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    encoder.encode(&families, &mut buf).expect("prometheus encoding cannot fail for a valid registry");
    String::from_utf8(buf).expect("prometheus text encoding is always valid utf-8")
}

/// Serves `/metrics` on `port` until the process exits. Two independent
/// listeners exist (API process, worker process) so either can scrape
/// without the other depending on it being up.
pub async fn serve_metrics(port: u16) -> Result<(), anyhow::Error> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "metrics listener starting");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}
