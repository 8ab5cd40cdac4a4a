//! Gateway error taxonomy.
//!
//! Every pipeline stage returns `Result<_, GatewayError>`. The conversion to
//! an HTTP response lives in one place (`http::response`), which is the only
//! code allowed to produce a 500 body.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the request pipeline.
#[derive(Debug, Error)]
pub enum GatewayError {
    // Policy rejections (4xx, never retried)
    #[error("origin `{origin}` is not allowed by the CORS policy")]
    CorsRejected { origin: String },

    #[error("client-supplied url rejected: {0}")]
    BlockedUrl(#[from] crate::security::ssrf::UrlRejection),

    #[error("proxy target host `{host}` is not a registered backend")]
    TargetNotAllowed { host: String },

    #[error("path `{path}` contains a dot segment")]
    InvalidPath { path: String },

    #[error("no service registered for path `{path}`")]
    NoRoute { path: String },

    #[error("service `{service}` is disabled by an invalid backend URL")]
    RouteDisabled { service: String },

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("request body could not be read: {0}")]
    InvalidBody(String),

    // Rate limiting
    #[error("rate limit exceeded for `{class}`")]
    RateLimited {
        class: String,
        message: String,
        code: String,
        limit: u32,
        reset_after: Duration,
    },

    // Upstream failures
    #[error("upstream `{service}` did not answer within {timeout:?}")]
    UpstreamTimeout { service: String, timeout: Duration },

    #[error("upstream `{service}` request failed: {source}")]
    UpstreamUnavailable {
        service: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // Anything unanticipated
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::CorsRejected { .. } => "cors",
            GatewayError::BlockedUrl(_) => "blocked_url",
            GatewayError::TargetNotAllowed { .. } => "target_not_allowed",
            GatewayError::InvalidPath { .. } => "invalid_path",
            GatewayError::NoRoute { .. } => "no_route",
            GatewayError::RouteDisabled { .. } => "route_disabled",
            GatewayError::PayloadTooLarge { .. } => "payload_too_large",
            GatewayError::InvalidBody(_) => "invalid_body",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::UpstreamTimeout { .. } => "upstream_timeout",
            GatewayError::UpstreamUnavailable { .. } => "upstream_unavailable",
            GatewayError::Internal(_) => "internal",
        }
    }

    /// True for errors caused by the request being refused by policy.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(
            self,
            GatewayError::CorsRejected { .. }
                | GatewayError::BlockedUrl(_)
                | GatewayError::TargetNotAllowed { .. }
                | GatewayError::InvalidPath { .. }
                | GatewayError::NoRoute { .. }
                | GatewayError::RouteDisabled { .. }
                | GatewayError::PayloadTooLarge { .. }
                | GatewayError::InvalidBody(_)
        )
    }
}
