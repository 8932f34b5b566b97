//! Request metrics
//!
//! Counts every handled request by method, matched route and status, and
//! serves the Prometheus text exposition at `GET /metrics`. Scrapes of the
//! metrics endpoint itself are not counted.

use axum::{
    Router,
    extract::{MatchedPath, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Counter incremented once per handled request
pub const REQUEST_COUNTER: &str = "request_total";

/// Path of the exposition endpoint
pub const METRICS_PATH: &str = "/metrics";

/// Label used when no route matched
const UNKNOWN_PATH: &str = "unknown";

/// Install the global Prometheus recorder
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Count a request after the inner service answered
pub async fn track_requests(request: Request, next: Next) -> Response {
    let path = match request.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => UNKNOWN_PATH.to_string(),
    };
    if path == METRICS_PATH {
        return next.run(request).await;
    }
    let method = request.method().to_string();

    let response = next.run(request).await;

    metrics::counter!(
        REQUEST_COUNTER,
        "method" => method,
        "path" => path,
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);

    response
}

async fn render(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// Add the `/metrics` route and count every request of `router`
pub fn observe(router: Router, handle: PrometheusHandle) -> Router {
    router
        .route(METRICS_PATH, get(render).with_state(handle))
        .layer(middleware::from_fn(track_requests))
}
