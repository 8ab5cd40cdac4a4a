//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, windows > 0)
//! - Detect duplicate prefixes and rate-limit classes
//! - Check CORS origins are bare `scheme://host[:port]` strings
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Malformed service URLs are NOT errors: the registry disables those
//!   routes at build time so one bad variable cannot take the gateway down

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::Method;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address `{0}` is not a socket address")]
    BindAddress(String),

    #[error("service `{name}`: path_prefix `{prefix}` must start with '/' and not end with '/'")]
    PathPrefix { name: String, prefix: String },

    #[error("path_prefix `{0}` is configured more than once")]
    DuplicatePrefix(String),

    #[error("cors origin `{0}` must be a bare scheme://host[:port] origin")]
    CorsOrigin(String),

    #[error("rate limit class `{0}` is configured more than once")]
    DuplicateClass(String),

    #[error("rate limit class `{name}`: {reason}")]
    RateLimitClass { name: String, reason: &'static str },

    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("security.max_body_size must be greater than zero")]
    ZeroBodyLimit,

    #[error("observability.metrics_address `{0}` is not a socket address")]
    MetricsAddress(String),
}

/// Validate a fully loaded configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    let mut prefixes = HashSet::new();
    for service in &config.services.routes {
        let prefix = &service.path_prefix;
        if !prefix.starts_with('/') || (prefix.len() > 1 && prefix.ends_with('/')) {
            errors.push(ValidationError::PathPrefix {
                name: service.name.clone(),
                prefix: prefix.clone(),
            });
        }
        if !prefixes.insert(prefix.as_str()) {
            errors.push(ValidationError::DuplicatePrefix(prefix.clone()));
        }
    }

    for origin in &config.cors.allowed_origins {
        if !is_bare_origin(origin) {
            errors.push(ValidationError::CorsOrigin(origin.clone()));
        }
    }

    let mut classes = HashSet::new();
    for class in &config.rate_limit.classes {
        if !classes.insert(class.name.as_str()) {
            errors.push(ValidationError::DuplicateClass(class.name.clone()));
        }
        let mut reject = |reason| {
            errors.push(ValidationError::RateLimitClass {
                name: class.name.clone(),
                reason,
            })
        };
        if class.window_secs == 0 {
            reject("window_secs must be greater than zero");
        }
        if class.max_requests == 0 {
            reject("max_requests must be greater than zero");
        }
        if !class.path.starts_with('/') {
            reject("path must start with '/'");
        }
        if let Some(method) = &class.method {
            if Method::from_bytes(method.as_bytes()).is_err() {
                reject("method is not a valid HTTP method");
            }
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_secs"));
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("upstream_secs"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Origins are compared byte-for-byte, so anything a browser would never
/// send in `Origin` (path, trailing slash, userinfo) can never match.
fn is_bare_origin(origin: &str) -> bool {
    match Url::parse(origin) {
        Ok(url) => url.origin().ascii_serialization() == origin,
        Err(_) => false,
    }
}
