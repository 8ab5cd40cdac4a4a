//! Client-supplied `url` field inspection.
//!
//! Looks for a field named `url` in a JSON or form-encoded body first, then
//! in the query string, and refuses the request before it is forwarded when
//! any value fails [`check_url`]. Repeated keys are all checked. Other
//! bodies are not buffered.

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use url::form_urlencoded;

use crate::error::GatewayError;
use crate::security::ssrf::{check_url, UrlRejection};

const FIELD: &str = "url";

/// Body encodings the guard understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Json,
    Form,
}

fn body_kind(headers: &HeaderMap) -> Option<BodyKind> {
    let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if mime == "application/json" || mime.ends_with("+json") {
        Some(BodyKind::Json)
    } else if mime == "application/x-www-form-urlencoded" {
        Some(BodyKind::Form)
    } else {
        None
    }
}

/// A `url` field as found in the request.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Candidate {
    Text(String),
    NotAString,
}

/// Every `url` value in a urlencoded string. A bracketed key such as
/// `url[href]` is parsed into an object or array by common frameworks, so
/// it can never be a plain URL string.
fn from_query(query: Option<&str>) -> Vec<Candidate> {
    let Some(query) = query else {
        return Vec::new();
    };
    form_urlencoded::parse(query.as_bytes())
        .filter_map(|(key, value)| {
            if key == FIELD {
                (!value.is_empty()).then(|| Candidate::Text(value.into_owned()))
            } else if key.strip_prefix(FIELD).is_some_and(|rest| rest.starts_with('[')) {
                Some(Candidate::NotAString)
            } else {
                None
            }
        })
        .collect()
}

/// Falsy values (`null`, `false`, `0`, `""`) count as absent so the query
/// string still gets a say. Any other non-string value cannot be a URL.
fn from_json(body: &[u8]) -> Option<Candidate> {
    let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) else {
        return None;
    };
    match map.get(FIELD)? {
        Value::Null | Value::Bool(false) => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(Candidate::Text(s.clone())),
        _ => Some(Candidate::NotAString),
    }
}

fn from_form(body: &[u8]) -> Vec<Candidate> {
    from_query(std::str::from_utf8(body).ok())
}

/// Every candidate must pass; one bad value refuses the request.
fn inspect(candidates: &[Candidate]) -> Result<(), UrlRejection> {
    candidates.iter().try_for_each(|candidate| match candidate {
        Candidate::NotAString => Err(UrlRejection::NotAString),
        Candidate::Text(url) => check_url(url).map(|_| ()),
    })
}

/// Maximum number of body bytes the guard will buffer.
#[derive(Debug, Clone, Copy)]
pub struct UrlGuard {
    pub max_body_size: usize,
}

pub async fn url_guard_middleware(
    State(guard): State<UrlGuard>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let query_candidates = from_query(request.uri().query());

    let Some(kind) = body_kind(request.headers()) else {
        reject_blocked(inspect(&query_candidates), &request)?;
        return Ok(next.run(request).await);
    };

    let declared_len = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared_len.is_some_and(|len| len > guard.max_body_size) {
        return Err(GatewayError::PayloadTooLarge {
            limit: guard.max_body_size,
        });
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, guard.max_body_size)
        .await
        .map_err(|e| GatewayError::InvalidBody(e.to_string()))?;

    let body_candidates: Vec<Candidate> = match kind {
        BodyKind::Json => from_json(&bytes).into_iter().collect(),
        BodyKind::Form => from_form(&bytes),
    };
    let candidates = if body_candidates.is_empty() {
        query_candidates
    } else {
        body_candidates
    };
    let request = Request::from_parts(parts, Body::from(bytes));
    reject_blocked(inspect(&candidates), &request)?;

    Ok(next.run(request).await)
}

fn reject_blocked(result: Result<(), UrlRejection>, request: &Request<Body>) -> Result<(), GatewayError> {
    result.map_err(|reason| {
        tracing::warn!(
            event = "blocked_url",
            path = %request.uri().path(),
            reason = %reason,
            "Security event"
        );
        GatewayError::BlockedUrl(reason)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{middleware, routing::any, Router};
    use axum::http::StatusCode;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/{*path}",
                any(|body: String| async move { format!("echo:{body}") }),
            )
            .layer(middleware::from_fn_with_state(
                UrlGuard { max_body_size: 1024 },
                url_guard_middleware,
            ))
    }

    fn json(body: &str) -> Request<Body> {
        Request::post("/api/restaurants")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[test]
    fn test_json_candidates() {
        assert_eq!(
            from_json(br#"{"url":"http://a.example"}"#),
            Some(Candidate::Text("http://a.example".into()))
        );
        assert_eq!(from_json(br#"{"url":null}"#), None);
        assert_eq!(from_json(br#"{"url":""}"#), None);
        assert_eq!(from_json(br#"{"url":42}"#), Some(Candidate::NotAString));
        assert_eq!(from_json(br#"{"url":0}"#), None);
        assert_eq!(from_json(br#"{"url":0.0}"#), None);
        assert_eq!(from_json(br#"{"url":false}"#), None);
        assert_eq!(from_json(br#"{"url":true}"#), Some(Candidate::NotAString));
        assert_eq!(from_json(br#"{"url":["http://a.example"]}"#), Some(Candidate::NotAString));
        assert_eq!(from_json(br#"{"name":"x"}"#), None);
        assert_eq!(from_json(br#"[{"url":"http://127.0.0.1"}]"#), None);
        assert_eq!(from_json(b"not json"), None);
    }

    #[test]
    fn test_query_candidates() {
        assert!(from_query(None).is_empty());
        assert!(from_query(Some("url=")).is_empty());
        assert_eq!(
            from_query(Some("url=&url=http%3A%2F%2F127.0.0.1%2Fadmin")),
            vec![Candidate::Text("http://127.0.0.1/admin".into())]
        );
        assert_eq!(
            from_query(Some("url=https%3A%2F%2Fa.example&url=http%3A%2F%2F10.0.0.1")),
            vec![
                Candidate::Text("https://a.example".into()),
                Candidate::Text("http://10.0.0.1".into()),
            ]
        );
        assert_eq!(from_query(Some("url[]=x")), vec![Candidate::NotAString]);
        assert_eq!(from_query(Some("url%5Bhref%5D=x")), vec![Candidate::NotAString]);
        assert!(from_query(Some("urls=x&avatar_url=y")).is_empty());
    }

    #[test]
    fn test_every_candidate_inspected() {
        assert!(inspect(&[]).is_ok());
        assert!(inspect(&[Candidate::Text("https://a.example".into())]).is_ok());
        assert!(inspect(&[
            Candidate::Text("https://a.example".into()),
            Candidate::Text("http://169.254.169.254/".into()),
        ])
        .is_err());
    }

    #[test]
    fn test_body_kind() {
        let mut headers = HeaderMap::new();
        assert_eq!(body_kind(&headers), None);
        headers.insert(header::CONTENT_TYPE, "application/json; charset=utf-8".parse().unwrap());
        assert_eq!(body_kind(&headers), Some(BodyKind::Json));
        headers.insert(header::CONTENT_TYPE, "application/x-www-form-urlencoded".parse().unwrap());
        assert_eq!(body_kind(&headers), Some(BodyKind::Form));
        headers.insert(header::CONTENT_TYPE, "multipart/form-data; boundary=x".parse().unwrap());
        assert_eq!(body_kind(&headers), None);
    }

    #[tokio::test]
    async fn test_blocked_body_url() {
        let response = app()
            .oneshot(json(r#"{"url": "http://127.0.0.1/admin"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::json!({"error": "Invalid or blocked URL"}));
    }

    #[tokio::test]
    async fn test_safe_body_passes_unchanged() {
        let payload = r#"{"url": "https://example.com"}"#;
        let response = app().oneshot(json(payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(body, format!("echo:{payload}").as_bytes());
    }

    #[tokio::test]
    async fn test_blocked_query_url() {
        let response = app()
            .oneshot(
                Request::get("/api/menu?url=http%3A%2F%2F192.168.0.10%2F")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_body_takes_precedence_over_query() {
        let request = Request::post("/api/menu?url=http%3A%2F%2Flocalhost")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"url":"https://example.com"}"#))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_form_body() {
        let request = Request::post("/api/menu")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=x&url=http%3A%2F%2F10.1.2.3%2F"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_form_body_duplicate_keys() {
        let request = Request::post("/api/menu")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("url=https%3A%2F%2Fexample.com&url=http%3A%2F%2Flocalhost%2F"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_falsy_json_url_falls_back_to_query() {
        let request = Request::post("/api/menu?url=https%3A%2F%2Fexample.com")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"url":0}"#))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::post("/api/menu?url=http%3A%2F%2F127.0.0.1")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"url":0}"#))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_declared_oversized_body() {
        let request = Request::post("/api/menu")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, "4096")
            .body(Body::from("{}"))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
