//! CORS origin enforcement.
//!
//! Unlike a permissive CORS layer that merely omits headers, a mismatched
//! `Origin` is refused outright with 403 and never reaches a backend.
//! Requests without `Origin` (curl, server-to-server) pass untouched.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::CorsConfig;
use crate::error::GatewayError;

const ALLOWED_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";

/// Outcome of an origin check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsDecision {
    /// No `Origin` header: not a browser cross-origin request.
    NoOrigin,
    /// Origin matched the allow-list; echo it back.
    Allowed(HeaderValue),
    /// Origin present but not allowed.
    Denied(String),
}

#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origins: Vec<HeaderValue>,
    allow_credentials: bool,
    max_age: Option<HeaderValue>,
}

impl CorsPolicy {
    pub fn from_config(config: &CorsConfig) -> Self {
        let allowed_origins = config
            .allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(origin = %origin, "Ignoring CORS origin that is not a valid header value");
                    None
                }
            })
            .collect();

        Self {
            allowed_origins,
            allow_credentials: config.allow_credentials,
            max_age: config.max_age_secs.map(HeaderValue::from),
        }
    }

    /// Exact, byte-for-byte comparison against the allow-list.
    pub fn check_origin(&self, origin: Option<&HeaderValue>) -> CorsDecision {
        match origin {
            None => CorsDecision::NoOrigin,
            Some(origin) => {
                if self
                    .allowed_origins
                    .iter()
                    .any(|allowed| allowed.as_bytes() == origin.as_bytes())
                {
                    CorsDecision::Allowed(origin.clone())
                } else {
                    CorsDecision::Denied(String::from_utf8_lossy(origin.as_bytes()).into_owned())
                }
            }
        }
    }

    fn decorate(&self, origin: &HeaderValue, headers: &mut HeaderMap) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        if self.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        } else {
            headers.remove(header::ACCESS_CONTROL_ALLOW_CREDENTIALS);
        }
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
    }

    fn preflight(&self, origin: &HeaderValue, request_headers: &HeaderMap) -> Response {
        let mut response = StatusCode::NO_CONTENT.into_response();
        let headers = response.headers_mut();
        self.decorate(origin, headers);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        if let Some(requested) = request_headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
            headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
            headers.append(
                header::VARY,
                HeaderValue::from_static("Access-Control-Request-Headers"),
            );
        }
        if let Some(max_age) = &self.max_age {
            headers.insert(header::ACCESS_CONTROL_MAX_AGE, max_age.clone());
        }
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("0"));
        response
    }
}

fn is_preflight(request: &Request<Body>) -> bool {
    request.method() == Method::OPTIONS
        && request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

pub async fn cors_middleware(
    State(policy): State<Arc<CorsPolicy>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    match policy.check_origin(request.headers().get(header::ORIGIN)) {
        CorsDecision::NoOrigin => Ok(next.run(request).await),
        CorsDecision::Denied(origin) => Err(GatewayError::CorsRejected { origin }),
        CorsDecision::Allowed(origin) => {
            if is_preflight(&request) {
                tracing::debug!(origin = ?origin, path = %request.uri().path(), "Answering CORS preflight");
                return Ok(policy.preflight(&origin, request.headers()));
            }
            let mut response = next.run(request).await;
            policy.decorate(&origin, response.headers_mut());
            Ok(response)
        }
    }
}
