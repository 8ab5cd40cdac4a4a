//! The ordered request pipeline.
//!
//! ```text
//! SetRequestId → Trace → PropagateRequestId → RequestMetrics
//!     → SecurityHeaders → CatchPanic → PathGuard → CORS → BodyLimit
//!     → UrlGuard → RateLimit → handler
//! ```
//!
//! Axum applies the last `.layer` outermost, so [`Pipeline::wrap`] lists the
//! stages innermost first. Security headers sit outside the panic catcher
//! and every rejection, so all responses are decorated, and request metrics
//! sit outside those. The path guard runs before any stage that matches on
//! the path. Rate limiting is innermost so the skip-successful release sees
//! the backend status.

use std::sync::Arc;

use axum::{body::Body, middleware, Router};
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::{ConfigError, GatewayConfig};
use crate::http::request::{make_request_span, propagate_request_id_layer, set_request_id_layer};
use crate::http::response::panic_response;
use crate::observability::metrics::request_metrics_middleware;
use crate::security::cors::{cors_middleware, CorsPolicy};
use crate::security::headers::{security_headers_middleware, SecurityHeaders};
use crate::security::path_guard::path_guard_middleware;
use crate::security::rate_limit::{rate_limit_middleware, RateLimiter};
use crate::security::url_guard::{url_guard_middleware, UrlGuard};

/// Policy state for every stage, built once from configuration.
#[derive(Debug, Clone)]
pub struct Pipeline {
    headers: Arc<SecurityHeaders>,
    cors: Arc<CorsPolicy>,
    limiter: Arc<RateLimiter>,
    url_guard: UrlGuard,
}

impl Pipeline {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            SecurityHeaders::from_config(&config.security)?,
            CorsPolicy::from_config(&config.cors),
            RateLimiter::from_config(&config.rate_limit),
            UrlGuard {
                max_body_size: config.security.max_body_size,
            },
        ))
    }

    pub fn new(
        headers: SecurityHeaders,
        cors: CorsPolicy,
        limiter: RateLimiter,
        url_guard: UrlGuard,
    ) -> Self {
        Self {
            headers: Arc::new(headers),
            cors: Arc::new(cors),
            limiter: Arc::new(limiter),
            url_guard,
        }
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Wrap the proxy router in every stage.
    pub fn wrap(&self, router: Router) -> Router {
        router
            .layer(middleware::from_fn_with_state(
                self.limiter.clone(),
                rate_limit_middleware,
            ))
            .layer(middleware::from_fn_with_state(
                self.url_guard,
                url_guard_middleware,
            ))
            .layer(RequestBodyLimitLayer::new(self.url_guard.max_body_size))
            .layer(middleware::from_fn_with_state(
                self.cors.clone(),
                cors_middleware,
            ))
            .layer(middleware::from_fn(path_guard_middleware))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(middleware::from_fn_with_state(
                self.headers.clone(),
                security_headers_middleware,
            ))
            .layer(middleware::from_fn(request_metrics_middleware))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
            .layer(set_request_id_layer())
    }
}
