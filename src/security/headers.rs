//! Security response headers.
//!
//! # Responsibilities
//! - Add CSP, HSTS, framing, sniffing and referrer headers to every response
//! - Strip identifying `Server` / `X-Powered-By` headers (also when relayed
//!   from a backend)
//!
//! # Design Decisions
//! - Header values are parsed once at startup; a bad CSP fails startup
//! - The middleware sits outside CORS and the panic catcher so rejections
//!   and 500s are decorated too

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{
        header::{self, HeaderName, InvalidHeaderValue},
        HeaderMap, HeaderValue, Request,
    },
    middleware::Next,
    response::Response,
};

use crate::config::SecurityConfig;

pub const X_POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

/// Precomputed set of security headers.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: HeaderMap,
}

impl SecurityHeaders {
    pub fn from_config(config: &SecurityConfig) -> Result<Self, InvalidHeaderValue> {
        let mut headers = HeaderMap::new();

        headers.insert(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_str(&config.content_security_policy)?,
        );
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_str(&format!(
                "max-age={}; includeSubDomains; preload",
                config.hsts_max_age_secs
            ))?,
        );

        let fixed: [(&'static str, &'static str); 10] = [
            ("x-frame-options", "DENY"),
            ("x-content-type-options", "nosniff"),
            ("referrer-policy", "no-referrer"),
            ("cross-origin-opener-policy", "same-origin"),
            ("cross-origin-resource-policy", "cross-origin"),
            ("origin-agent-cluster", "?1"),
            ("x-dns-prefetch-control", "off"),
            ("x-download-options", "noopen"),
            ("x-permitted-cross-domain-policies", "none"),
            ("x-xss-protection", "0"),
        ];
        for (name, value) in fixed {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }

        Ok(Self { headers })
    }

    /// Overwrite the security headers and remove banner headers.
    pub fn apply(&self, target: &mut HeaderMap) {
        target.remove(header::SERVER);
        target.remove(X_POWERED_BY);
        for (name, value) in self.headers.iter() {
            target.insert(name.clone(), value.clone());
        }
    }
}

pub async fn security_headers_middleware(
    State(headers): State<Arc<SecurityHeaders>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    headers.apply(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_headers() {
        let headers = SecurityHeaders::from_config(&SecurityConfig::default()).unwrap();
        let mut map = HeaderMap::new();
        headers.apply(&mut map);

        assert_eq!(map["x-frame-options"], "DENY");
        assert_eq!(map["x-content-type-options"], "nosniff");
        assert_eq!(map["referrer-policy"], "no-referrer");
        assert_eq!(
            map["strict-transport-security"],
            "max-age=63072000; includeSubDomains; preload"
        );

        let csp = map["content-security-policy"].to_str().unwrap();
        assert!(csp.starts_with("default-src 'self'"));
        assert!(csp.contains("img-src 'self' data:"));
        assert!(csp.contains("object-src 'none'"));
        assert!(csp.contains("frame-ancestors 'none'"));
        assert!(!csp.contains("unsafe-inline"));
    }

    #[test]
    fn test_banner_headers_removed() {
        let headers = SecurityHeaders::from_config(&SecurityConfig::default()).unwrap();
        let mut map = HeaderMap::new();
        map.insert(header::SERVER, HeaderValue::from_static("Express"));
        map.insert(X_POWERED_BY, HeaderValue::from_static("Express"));
        map.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
        headers.apply(&mut map);

        assert!(map.get(header::SERVER).is_none());
        assert!(map.get(X_POWERED_BY).is_none());
        assert_eq!(map[header::X_FRAME_OPTIONS], "DENY");
    }

    #[test]
    fn test_invalid_csp_rejected() {
        let config = SecurityConfig {
            content_security_policy: "default-src\n'self'".into(),
            ..SecurityConfig::default()
        };
        assert!(SecurityHeaders::from_config(&config).is_err());
    }
}
