//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Downstream services keyed by path prefix.
    pub services: ServicesConfig,

    /// CORS origin allow-list.
    pub cors: CorsConfig,

    /// Per-route-class rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Security headers and request limits.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5000"). `PORT` overrides the port.
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
        }
    }
}

/// Wrapper so that an absent `[[services.routes]]` table falls back to the
/// platform's default service map instead of an empty one.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub routes: Vec<ServiceConfig>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            routes: default_services(),
        }
    }
}

/// A downstream service reachable under a path prefix.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Service identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match (segment boundary).
    pub path_prefix: String,

    /// Backend base URL (e.g., "http://auth-service:5001").
    pub url: String,

    /// Environment variable that overrides `url` when set.
    #[serde(default)]
    pub url_env: Option<String>,

    /// Remove `path_prefix` before forwarding.
    #[serde(default)]
    pub strip_prefix: bool,
}

impl ServiceConfig {
    fn new(name: &str, path_prefix: &str, url: &str, url_env: &str) -> Self {
        Self {
            name: name.to_string(),
            path_prefix: path_prefix.to_string(),
            url: url.to_string(),
            url_env: Some(url_env.to_string()),
            strip_prefix: false,
        }
    }
}

fn default_services() -> Vec<ServiceConfig> {
    vec![
        ServiceConfig::new("auth", "/api/auth", "http://localhost:5001", "AUTH_SERVICE_URL"),
        ServiceConfig::new("restaurants", "/api/restaurants", "http://localhost:5002", "RESTAURANT_SERVICE_URL"),
        ServiceConfig::new("menu", "/api/menu", "http://localhost:5002", "RESTAURANT_MENU_SERVICE_URL"),
        ServiceConfig::new("orders", "/api/orders", "http://localhost:5003", "ORDER_SERVICE_URL"),
        ServiceConfig::new("cart", "/api/cart", "http://localhost:5003", "CART_SERVICE_URL"),
        ServiceConfig::new("deliveries", "/api/deliveries", "http://localhost:5004", "DELIVERY_SERVICE_URL"),
        ServiceConfig::new("payment", "/api/payment", "http://localhost:5005", "PAYMENT_SERVICE_URL"),
        ServiceConfig::new("notifications", "/api/notifications", "http://localhost:5006", "NOTIFICATION_SERVICE_URL"),
    ]
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Exact-match origins. `CLIENT_URL` replaces this list with one entry.
    pub allowed_origins: Vec<String>,

    /// Emit `Access-Control-Allow-Credentials: true` for allowed origins.
    pub allow_credentials: bool,

    /// Preflight cache lifetime in seconds (omitted when `None`).
    pub max_age_secs: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3030".to_string()],
            allow_credentials: true,
            max_age_secs: None,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Use the first `X-Forwarded-For` entry as the client IP, and extend
    /// inbound `X-Forwarded-*` headers instead of replacing them.
    pub trust_forwarded_for: bool,

    /// Counter table size that triggers a sweep of expired windows.
    pub cleanup_threshold: usize,

    /// Minimum seconds between two sweeps.
    pub cleanup_interval_secs: u64,

    /// Limited route classes.
    pub classes: Vec<RateLimitClassConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trust_forwarded_for: false,
            cleanup_threshold: 10_000,
            cleanup_interval_secs: 60,
            classes: default_rate_limit_classes(),
        }
    }
}

/// One rate-limited route class.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RateLimitClassConfig {
    /// Class name used in counter keys, logs and metrics.
    pub name: String,

    /// HTTP method to match; `None` matches any method.
    #[serde(default)]
    pub method: Option<String>,

    /// Exact request path.
    pub path: String,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Requests allowed per window.
    pub max_requests: u32,

    /// Give the slot back when the backend answers below 400.
    #[serde(default)]
    pub skip_successful_requests: bool,

    /// `error` field of the 429 body.
    pub message: String,

    /// `code` field of the 429 body.
    #[serde(default = "default_rate_limit_code")]
    pub code: String,
}

fn default_rate_limit_code() -> String {
    "RATE_LIMIT_EXCEEDED".to_string()
}

fn default_rate_limit_classes() -> Vec<RateLimitClassConfig> {
    vec![
        RateLimitClassConfig {
            name: "login".to_string(),
            method: Some("POST".to_string()),
            path: "/api/auth/login".to_string(),
            window_secs: 15 * 60,
            max_requests: 5,
            skip_successful_requests: true,
            message: "Too many authentication attempts, please try again in 15 minutes".to_string(),
            code: default_rate_limit_code(),
        },
        RateLimitClassConfig {
            name: "register".to_string(),
            method: Some("POST".to_string()),
            path: "/api/auth/register".to_string(),
            window_secs: 60 * 60,
            max_requests: 3,
            skip_successful_requests: false,
            message: "Too many registration attempts, please try again in 1 hour".to_string(),
            code: default_rate_limit_code(),
        },
        RateLimitClassConfig {
            name: "oauth".to_string(),
            method: Some("POST".to_string()),
            path: "/api/auth/google-auth".to_string(),
            window_secs: 10 * 60,
            max_requests: 10,
            skip_successful_requests: false,
            message: "Too many OAuth attempts, please try again in 10 minutes".to_string(),
            code: default_rate_limit_code(),
        },
    ]
}

/// Timeout configuration for upstream calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Deadline for the backend's response head (includes connect) in seconds.
    pub upstream_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 60,
            upstream_secs: 60,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// `max-age` of the HSTS header.
    pub hsts_max_age_secs: u64,

    /// Full `Content-Security-Policy` value.
    pub content_security_policy: String,
}

pub const DEFAULT_CONTENT_SECURITY_POLICY: &str = "default-src 'self'; script-src 'self'; \
style-src 'self'; font-src 'self'; img-src 'self' data:; connect-src 'self'; \
frame-ancestors 'none'; object-src 'none'; base-uri 'self'; form-action 'self'; \
script-src-attr 'none'; upgrade-insecure-requests";

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            hsts_max_age_secs: 63_072_000,  // two years
            content_security_policy: DEFAULT_CONTENT_SECURITY_POLICY.to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
