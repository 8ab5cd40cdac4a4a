//! Reverse proxy dispatch.
//!
//! # Responsibilities
//! - Build the outbound request for a resolved service
//! - Refuse targets outside the allowed host set before connecting
//! - Forward an allow-list of request headers, rewrite `Host`
//! - Relay status, headers and streamed body back to the client
//!
//! # Design Decisions
//! - One pooled hyper client for all services, http and https (rustls,
//!   webpki roots)
//! - Bodies stream in both directions; nothing is buffered here
//! - No retries and no caching

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, Request, Uri},
    response::Response,
};
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::TimeoutConfig;
use crate::error::GatewayError;
use crate::http::request::X_REQUEST_ID;
use crate::resilience::with_deadline;
use crate::routing::ServiceRoute;
use crate::security::ssrf::{authority, AllowedHostSet};

pub type HttpsClient = Client<HttpsConnector<HttpConnector>, Body>;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Request headers a backend may see. Everything else is dropped.
const FORWARDED_HEADERS: [HeaderName; 8] = [
    header::AUTHORIZATION,
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::ACCEPT,
    header::ACCEPT_LANGUAGE,
    header::USER_AGENT,
    header::COOKIE,
    X_REQUEST_ID,
];

/// Connection-scoped headers never relayed back to the client.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub struct Dispatcher {
    client: HttpsClient,
    allowed_hosts: AllowedHostSet,
    upstream_timeout: Duration,
    trust_forwarded_for: bool,
}

impl Dispatcher {
    /// `trust_forwarded_for` extends inbound `X-Forwarded-*` values instead
    /// of replacing them; set it only behind a trusted reverse proxy.
    pub fn new(
        timeouts: &TimeoutConfig,
        allowed_hosts: AllowedHostSet,
        trust_forwarded_for: bool,
    ) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));

        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new()).build(https);

        Self {
            client,
            allowed_hosts,
            upstream_timeout: Duration::from_secs(timeouts.upstream_secs),
            trust_forwarded_for,
        }
    }

    pub fn allowed_hosts(&self) -> &AllowedHostSet {
        &self.allowed_hosts
    }

    /// Forward `request` to `route`'s backend and relay the answer.
    pub async fn forward(
        &self,
        route: &ServiceRoute,
        request: Request<Body>,
    ) -> Result<Response, GatewayError> {
        let (parts, body) = request.into_parts();
        let target = route.target_url(parts.uri.path(), parts.uri.query());

        if !self.allowed_hosts.is_allowed_target(&target) {
            return Err(GatewayError::TargetNotAllowed {
                host: authority(&target).unwrap_or_default(),
            });
        }

        let uri: Uri = target
            .as_str()
            .parse()
            .map_err(|e| GatewayError::Internal(format!("target `{target}` is not a valid URI: {e}")))?;
        let host = authority(&target)
            .and_then(|a| HeaderValue::from_str(&a).ok())
            .ok_or_else(|| GatewayError::Internal(format!("target `{target}` has no host")))?;

        let mut outbound = Request::builder()
            .method(parts.method.clone())
            .uri(uri)
            .body(body)
            .map_err(|e| GatewayError::Internal(format!("failed to build upstream request: {e}")))?;
        let headers = outbound.headers_mut();
        copy_forwarded_headers(&parts.headers, headers);
        add_forwarding_headers(&parts, headers, self.trust_forwarded_for);
        headers.insert(header::HOST, host);

        tracing::debug!(
            service = %route.name,
            method = %parts.method,
            target = %target.path(),
            "Forwarding request"
        );

        let response = with_deadline(
            &route.name,
            self.upstream_timeout,
            self.client.request(outbound),
        )
        .await?;

        Ok(relay(response))
    }
}

/// Backend response → client response, body streamed as-is.
fn relay(response: hyper::Response<Incoming>) -> Response {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

fn copy_forwarded_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for name in FORWARDED_HEADERS.iter() {
        for value in from.get_all(name) {
            to.append(name.clone(), value.clone());
        }
    }
}

/// `X-Forwarded-For` carries the peer address; proto and host describe the
/// gateway-facing request. Inbound values are kept only when `trusted`.
fn add_forwarding_headers(parts: &Parts, headers: &mut HeaderMap, trusted: bool) {
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    let prior = parts
        .headers
        .get(&X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .filter(|_| trusted);
    let chain = match (prior, peer) {
        (Some(prior), Some(peer)) => Some(format!("{prior}, {peer}")),
        (None, Some(peer)) => Some(peer),
        (Some(prior), None) => Some(prior.to_string()),
        (None, None) => None,
    };
    if let Some(value) = chain.and_then(|c| HeaderValue::from_str(&c).ok()) {
        headers.insert(X_FORWARDED_FOR, value);
    }

    let proto = parts
        .headers
        .get(&X_FORWARDED_PROTO)
        .filter(|_| trusted)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("http"));
    headers.insert(X_FORWARDED_PROTO, proto);

    let host = parts
        .headers
        .get(&X_FORWARDED_HOST)
        .filter(|_| trusted)
        .or_else(|| parts.headers.get(header::HOST));
    if let Some(host) = host {
        headers.insert(X_FORWARDED_HOST, host.clone());
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_allow_list() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        inbound.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        inbound.insert(header::COOKIE, HeaderValue::from_static("sid=1"));
        inbound.insert("x-internal-debug", HeaderValue::from_static("1"));
        inbound.insert(header::ORIGIN, HeaderValue::from_static("http://localhost:3030"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

        let mut outbound = HeaderMap::new();
        copy_forwarded_headers(&inbound, &mut outbound);

        assert_eq!(outbound[header::AUTHORIZATION], "Bearer t");
        assert_eq!(outbound[header::CONTENT_TYPE], "application/json");
        assert_eq!(outbound[header::COOKIE], "sid=1");
        assert!(outbound.get("x-internal-debug").is_none());
        assert!(outbound.get(header::ORIGIN).is_none());
        assert!(outbound.get(header::CONNECTION).is_none());
    }

    fn forwarded_parts() -> Parts {
        let mut request = Request::get("/api/cart")
            .header(header::HOST, "gateway.example")
            .header("x-forwarded-for", "203.0.113.9")
            .header("x-forwarded-proto", "https")
            .header("x-forwarded-host", "spoofed.example")
            .body(())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 40000))));
        request.into_parts().0
    }

    #[test]
    fn test_forwarding_headers_ignore_client_values() {
        let mut headers = HeaderMap::new();
        add_forwarding_headers(&forwarded_parts(), &mut headers, false);

        assert_eq!(headers[&X_FORWARDED_FOR], "10.0.0.7");
        assert_eq!(headers[&X_FORWARDED_PROTO], "http");
        assert_eq!(headers[&X_FORWARDED_HOST], "gateway.example");
    }

    #[test]
    fn test_forwarding_headers_extend_trusted_proxy() {
        let mut headers = HeaderMap::new();
        add_forwarding_headers(&forwarded_parts(), &mut headers, true);

        assert_eq!(headers[&X_FORWARDED_FOR], "203.0.113.9, 10.0.0.7");
        assert_eq!(headers[&X_FORWARDED_PROTO], "https");
        assert_eq!(headers[&X_FORWARDED_HOST], "spoofed.example");
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("close, x-trace-hop"));
        headers.insert("x-trace-hop", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }
}
