//! Dot-segment rejection.
//!
//! Every stage matches on the raw request path, while the outbound URL is
//! built with WHATWG path parsing, which collapses `.` and `..` segments
//! (including `%2e` spellings and `\` separators). A path containing one
//! could be classified by one stage and forwarded somewhere else, so it is
//! refused before any other policy runs.

use axum::{body::Body, http::Request, middleware::Next, response::Response};

use crate::error::GatewayError;

/// True when a segment is `.` or `..` once `%2e` is read as a dot.
fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

/// True when any segment of `path` would be collapsed by URL parsing.
pub fn has_dot_segment(path: &str) -> bool {
    path.split(['/', '\\']).any(is_dot_segment)
}

pub async fn path_guard_middleware(
    request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let path = request.uri().path();
    if has_dot_segment(path) {
        tracing::warn!(
            event = "dot_segment_path",
            method = %request.method(),
            path = %path,
            "Security event"
        );
        return Err(GatewayError::InvalidPath {
            path: path.to_string(),
        });
    }
    Ok(next.run(request).await)
}
