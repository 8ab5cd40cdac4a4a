//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): every response by method, status, service
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): 429s by route class
//! - `gateway_policy_rejections_total` (counter): refused requests by kind
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Service that produced a response. Attached by the proxy handler;
/// responses without it were answered by the gateway itself.
#[derive(Debug, Clone)]
pub struct ServiceLabel(pub String);

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, service: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "service" => service.to_string()
    )
    .increment(1);
    histogram!(
        "gateway_request_duration_seconds",
        "method" => method.to_string(),
        "service" => service.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Count every response the pipeline produces, rejections included.
pub async fn request_metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let response = next.run(request).await;
    let service = response
        .extensions()
        .get::<ServiceLabel>()
        .map_or("none", |label| label.0.as_str());
    record_request(&method, response.status().as_u16(), service, start);
    response
}

pub fn record_rate_limited(class: &str) {
    counter!("gateway_rate_limited_total", "class" => class.to_string()).increment(1);
}

pub fn record_policy_rejection(kind: &'static str) {
    counter!("gateway_policy_rejections_total", "kind" => kind).increment(1);
}
