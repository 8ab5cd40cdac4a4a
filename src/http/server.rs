//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Compile configuration into the registry, dispatcher and pipeline
//! - Create the Axum router with the catch-all proxy handler
//! - Bind the server to a listener and shut down gracefully
//! - Label responses with the service that produced them

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::{ConfigError, GatewayConfig};
use crate::http::pipeline::Pipeline;
use crate::http::proxy::Dispatcher;
use crate::http::request::request_id;
use crate::observability::metrics::ServiceLabel;
use crate::routing::ServiceRegistry;
use crate::security::ssrf::AllowedHostSet;

/// Application state injected into the proxy handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServiceRegistry>,
    pub dispatcher: Arc<Dispatcher>,
}

/// The gateway: pipeline + registry + dispatcher behind one listener.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
}

impl GatewayServer {
    /// Build the server. The allowed host set is derived from the same
    /// service table the registry is built from.
    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        let allowed_hosts =
            AllowedHostSet::from_urls(config.services.routes.iter().map(|s| s.url.as_str()));
        Self::with_allowed_hosts(config, allowed_hosts)
    }

    /// Build the server with an explicit allowed host set.
    pub fn with_allowed_hosts(
        config: GatewayConfig,
        allowed_hosts: AllowedHostSet,
    ) -> Result<Self, ConfigError> {
        let registry = Arc::new(ServiceRegistry::from_config(&config.services.routes));
        tracing::info!(
            services = registry.routes().count(),
            disabled = registry.disabled().count(),
            allowed_hosts = allowed_hosts.len(),
            "Service registry compiled"
        );

        let dispatcher = Arc::new(Dispatcher::new(
            &config.timeouts,
            allowed_hosts,
            config.rate_limit.trust_forwarded_for,
        ));
        let pipeline = Pipeline::from_config(&config)?;

        let state = AppState {
            registry,
            dispatcher,
        };
        let router = pipeline.wrap(Self::build_router(state));

        Ok(Self { router, config })
    }

    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/", any(proxy_handler))
            .route("/{*path}", any(proxy_handler))
            .with_state(state)
    }

    /// The fully layered router, for driving without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Gateway listening");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Resolve the service and forward. Errors become responses here so the
/// service label survives on them.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let path = request.uri().path().to_string();
    let id = request_id(request.headers()).unwrap_or("-").to_string();

    let (service, result) = match state.registry.resolve(&path) {
        Ok(route) => (
            route.name.as_str(),
            state.dispatcher.forward(route, request).await,
        ),
        Err(e) => ("none", Err(e)),
    };

    if let Err(e) = &result {
        tracing::debug!(request_id = %id, service, kind = e.kind(), "Request not forwarded");
    }
    let mut response = result.unwrap_or_else(IntoResponse::into_response);
    response
        .extensions_mut()
        .insert(ServiceLabel(service.to_string()));
    response
}
