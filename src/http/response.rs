//! Error normalization.
//!
//! # Responsibilities
//! - Convert every `GatewayError` into its client-facing response
//! - Turn handler panics into the same opaque 500
//! - Log the full detail server-side under a correlation reference
//!
//! # Design Decisions
//! - The 500 body never contains the internal message or panic payload
//! - References are random 53-bit integers so they survive JSON numbers
//! - `X-Content-Type-Options: nosniff` is set here too, so an error raised
//!   outside the security header stage is still covered

use std::any::Any;

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::GatewayError;
use crate::observability::metrics;
use crate::security::rate_limit::{insert_rate_limit_headers, RATELIMIT_RESET};

pub const INTERNAL_ERROR_MESSAGE: &str = "An unexpected error occurred.";
pub const CORS_REJECTED_MESSAGE: &str =
    "The CORS policy for this site does not allow access from the specified Origin.";
pub const BLOCKED_URL_MESSAGE: &str = "Invalid or blocked URL";

/// Largest integer a JSON number can carry exactly.
const MAX_REFERENCE: u64 = 1 << 53;

/// New correlation reference for an internal fault.
pub fn new_reference() -> u64 {
    fastrand::u64(1..MAX_REFERENCE)
}

/// The opaque 500 response. `detail` is logged, never sent.
pub fn internal_error_response(detail: &str) -> Response {
    let reference = new_reference();
    tracing::error!(reference, error = %detail, "Unhandled error");

    let mut response = (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": INTERNAL_ERROR_MESSAGE, "reference": reference })),
    )
        .into_response();
    set_nosniff(response.headers_mut());
    response
}

/// Panic handler for `CatchPanicLayer::custom`.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else {
        "non-string panic payload"
    };
    internal_error_response(&format!("handler panicked: {detail}"))
}

fn set_nosniff(headers: &mut HeaderMap) {
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        if self.is_policy_rejection() {
            metrics::record_policy_rejection(self.kind());
        }

        match self {
            GatewayError::CorsRejected { origin } => {
                tracing::warn!(event = "cors_rejected", origin = %origin, "Security event");
                error_body(StatusCode::FORBIDDEN, CORS_REJECTED_MESSAGE)
            }
            GatewayError::BlockedUrl(reason) => {
                tracing::debug!(reason = %reason, "Blocked client-supplied URL");
                error_body(StatusCode::BAD_REQUEST, BLOCKED_URL_MESSAGE)
            }
            GatewayError::TargetNotAllowed { host } => {
                tracing::warn!(event = "target_not_allowed", host = %host, "Security event");
                error_body(StatusCode::BAD_REQUEST, "Target host is not allowed")
            }
            GatewayError::InvalidPath { .. } => error_body(StatusCode::BAD_REQUEST, "Invalid path"),
            GatewayError::NoRoute { path } => {
                tracing::debug!(path = %path, "No service matched");
                error_body(StatusCode::NOT_FOUND, "Not found")
            }
            GatewayError::RouteDisabled { service } => {
                tracing::warn!(service = %service, "Request for disabled service");
                error_body(StatusCode::NOT_FOUND, "Not found")
            }
            GatewayError::PayloadTooLarge { limit } => {
                tracing::debug!(limit, "Request body too large");
                error_body(StatusCode::PAYLOAD_TOO_LARGE, "Payload too large")
            }
            GatewayError::InvalidBody(reason) => {
                tracing::debug!(reason = %reason, "Unreadable request body");
                error_body(StatusCode::BAD_REQUEST, "Invalid request body")
            }
            GatewayError::RateLimited {
                message,
                code,
                limit,
                reset_after,
                ..
            } => {
                let mut response = (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": message, "code": code })),
                )
                    .into_response();
                let headers = response.headers_mut();
                insert_rate_limit_headers(headers, limit, 0, reset_after);
                if let Some(reset) = headers.get(RATELIMIT_RESET).cloned() {
                    headers.insert(header::RETRY_AFTER, reset);
                }
                response
            }
            GatewayError::UpstreamTimeout { service, timeout } => {
                tracing::error!(service = %service, timeout = ?timeout, "Upstream timed out");
                error_body(StatusCode::GATEWAY_TIMEOUT, "Gateway timeout")
            }
            GatewayError::UpstreamUnavailable { service, source } => {
                tracing::error!(service = %service, error = %source, "Upstream request failed");
                error_body(StatusCode::BAD_GATEWAY, "Bad gateway")
            }
            GatewayError::Internal(detail) => internal_error_response(&detail),
        }
    }
}
