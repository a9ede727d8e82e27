//! Per-route request latency, keyed by the matched route template (not
//! the raw path, which would blow up the label cardinality with every
//! distinct id) and response status.

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

pub async fn track_metrics(req: Request<Body>, next: Next<Body>) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let timer = std::time::Instant::now();
    let response = next.run(req).await;
    let elapsed = timer.elapsed().as_secs_f64();

    observability::metrics::HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&route, response.status().as_str()])
        .observe(elapsed);

    response.into_response()
}
