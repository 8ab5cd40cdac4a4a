//! Per-client rate limiting for sensitive auth routes.
//!
//! # Algorithm
//!
//! Fixed window with rolling restart:
//! - Each (client IP, route class) has a counter and the instant its window began
//! - The first request after the window expired starts a new window
//! - Every matching request increments the counter; the request is refused
//!   when the incremented count exceeds the class maximum
//! - Classes that skip successful requests give the slot back once the
//!   backend answers below 400
//!
//! # Thread Safety
//!
//! Increment-and-compare happens under the DashMap shard lock for the key,
//! so two racing requests can never both take the last slot.
//!
//! # Memory Management
//!
//! Expired windows are swept lazily once the table grows past
//! `cleanup_threshold`, at most once per `cleanup_interval`.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;

use crate::config::{RateLimitClassConfig, RateLimitConfig};
use crate::error::GatewayError;
use crate::observability::metrics;

pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Counter identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub client: String,
    pub class: String,
}

/// Counter state right after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    pub count: u32,
    pub window_start: Instant,
    pub resets_at: Instant,
}

/// Storage for window counters.
///
/// The in-process [`MemoryStore`] is enough for a single gateway instance.
/// Running several instances behind a balancer needs a shared store
/// implementing this trait.
pub trait CounterStore: Send + Sync + fmt::Debug {
    /// Atomically start a new window if the old one expired, then increment.
    fn increment(&self, key: &CounterKey, window: Duration, now: Instant) -> WindowState;

    /// Undo one increment, but only if the window that began at
    /// `window_start` is still current.
    fn release(&self, key: &CounterKey, window_start: Instant);

    /// Drop expired windows. Returns how many were removed.
    fn sweep(&self, now: Instant) -> usize;

    /// Number of tracked counters.
    fn len(&self) -> usize;
}

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u32,
    window_start: Instant,
    window: Duration,
}

impl Counter {
    fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.window_start) >= self.window
    }
}

/// Per-process counter table.
#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: DashMap<CounterKey, Counter>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryStore {
    fn increment(&self, key: &CounterKey, window: Duration, now: Instant) -> WindowState {
        let mut counter = self.counters.entry(key.clone()).or_insert(Counter {
            count: 0,
            window_start: now,
            window,
        });

        if counter.expired(now) {
            counter.count = 0;
            counter.window_start = now;
            counter.window = window;
        }
        counter.count = counter.count.saturating_add(1);

        WindowState {
            count: counter.count,
            window_start: counter.window_start,
            resets_at: counter.window_start + counter.window,
        }
    }

    fn release(&self, key: &CounterKey, window_start: Instant) {
        if let Some(mut counter) = self.counters.get_mut(key) {
            if counter.window_start == window_start && counter.count > 0 {
                counter.count -= 1;
            }
        }
    }

    fn sweep(&self, now: Instant) -> usize {
        let before = self.counters.len();
        self.counters.retain(|_, counter| !counter.expired(now));
        before.saturating_sub(self.counters.len())
    }

    fn len(&self) -> usize {
        self.counters.len()
    }
}

/// A compiled rate-limit class.
#[derive(Debug, Clone)]
pub struct RateLimitClass {
    pub name: String,
    pub method: Option<Method>,
    pub path: String,
    pub window: Duration,
    pub max_requests: u32,
    pub skip_successful_requests: bool,
    pub message: String,
    pub code: String,
}

impl RateLimitClass {
    fn from_config(config: &RateLimitClassConfig) -> Option<Self> {
        let method = match &config.method {
            Some(m) => match Method::from_bytes(m.to_ascii_uppercase().as_bytes()) {
                Ok(method) => Some(method),
                Err(_) => {
                    tracing::warn!(class = %config.name, method = %m, "Skipping rate limit class with invalid method");
                    return None;
                }
            },
            None => None,
        };

        Some(Self {
            name: config.name.clone(),
            method,
            path: normalize_path(&config.path).to_ascii_lowercase(),
            window: Duration::from_secs(config.window_secs),
            max_requests: config.max_requests,
            skip_successful_requests: config.skip_successful_requests,
            message: config.message.clone(),
            code: config.code.clone(),
        })
    }

    /// Routing on the backends is case-insensitive and ignores one trailing
    /// slash, so matching here must be at least as loose or the limit could
    /// be sidestepped with `/api/auth/Login/`.
    fn matches(&self, method: &Method, path: &str) -> bool {
        if let Some(expected) = &self.method {
            if expected != method {
                return false;
            }
        }
        normalize_path(path).eq_ignore_ascii_case(&self.path)
    }
}

fn normalize_path(path: &str) -> &str {
    if path.len() > 1 {
        path.strip_suffix('/').unwrap_or(path)
    } else {
        path
    }
}

/// Result of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
    pub window_start: Instant,
}

/// Rate limiter shared by all connections.
#[derive(Debug)]
pub struct RateLimiter {
    classes: Vec<RateLimitClass>,
    store: Arc<dyn CounterStore>,
    trust_forwarded_for: bool,
    cleanup_threshold: usize,
    cleanup_interval: Duration,
    last_sweep: Mutex<Instant>,
}

impl RateLimiter {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: &RateLimitConfig, store: Arc<dyn CounterStore>) -> Self {
        let classes = if config.enabled {
            config
                .classes
                .iter()
                .filter_map(RateLimitClass::from_config)
                .collect()
        } else {
            Vec::new()
        };

        Self {
            classes,
            store,
            trust_forwarded_for: config.trust_forwarded_for,
            cleanup_threshold: config.cleanup_threshold,
            cleanup_interval: Duration::from_secs(config.cleanup_interval_secs),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    /// Find the class governing a request, if any.
    pub fn classify(&self, method: &Method, path: &str) -> Option<&RateLimitClass> {
        self.classes.iter().find(|class| class.matches(method, path))
    }

    pub fn check(&self, class: &RateLimitClass, client: &str) -> RateLimitDecision {
        self.check_at(class, client, Instant::now())
    }

    pub fn check_at(&self, class: &RateLimitClass, client: &str, now: Instant) -> RateLimitDecision {
        self.maybe_sweep(now);

        let state = self.store.increment(&key(class, client), class.window, now);
        RateLimitDecision {
            allowed: state.count <= class.max_requests,
            limit: class.max_requests,
            remaining: class.max_requests.saturating_sub(state.count),
            reset_after: state.resets_at.saturating_duration_since(now),
            window_start: state.window_start,
        }
    }

    /// Give back the slot taken by a request that turned out successful.
    pub fn release(&self, class: &RateLimitClass, client: &str, window_start: Instant) {
        self.store.release(&key(class, client), window_start);
    }

    fn maybe_sweep(&self, now: Instant) {
        if self.store.len() < self.cleanup_threshold {
            return;
        }
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if now.duration_since(*last) < self.cleanup_interval {
            return;
        }
        *last = now;
        let removed = self.store.sweep(now);
        tracing::debug!(removed, remaining = self.store.len(), "Swept expired rate limit windows");
    }
}

fn key(class: &RateLimitClass, client: &str) -> CounterKey {
    CounterKey {
        client: client.to_string(),
        class: class.name.clone(),
    }
}

/// Client address used as the counter key.
pub fn client_ip(request: &Request<Body>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Write the `RateLimit-*` triple.
pub fn insert_rate_limit_headers(
    headers: &mut HeaderMap,
    limit: u32,
    remaining: u32,
    reset_after: Duration,
) {
    let reset_secs = reset_after.as_secs() + u64::from(reset_after.subsec_nanos() > 0);
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(limit));
    headers.insert(RATELIMIT_REMAINING, HeaderValue::from(remaining));
    headers.insert(RATELIMIT_RESET, HeaderValue::from(reset_secs));
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let Some(class) = limiter.classify(request.method(), request.uri().path()) else {
        return Ok(next.run(request).await);
    };

    let client = client_ip(&request, limiter.trust_forwarded_for);
    let decision = limiter.check(class, &client);

    if !decision.allowed {
        let user_agent = request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        tracing::warn!(
            event = "rate_limit_exceeded",
            ip = %client,
            class = %class.name,
            user_agent = %user_agent,
            "Security event"
        );
        metrics::record_rate_limited(&class.name);
        return Err(GatewayError::RateLimited {
            class: class.name.clone(),
            message: class.message.clone(),
            code: class.code.clone(),
            limit: decision.limit,
            reset_after: decision.reset_after,
        });
    }

    let mut response = next.run(request).await;

    let mut remaining = decision.remaining;
    if class.skip_successful_requests && response.status().as_u16() < 400 {
        limiter.release(class, &client, decision.window_start);
        remaining = (remaining + 1).min(decision.limit);
    }

    insert_rate_limit_headers(
        response.headers_mut(),
        decision.limit,
        remaining,
        decision.reset_after,
    );
    Ok(response)
}
