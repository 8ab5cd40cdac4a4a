//! Food delivery API gateway.
//!
//! Single public entry point in front of the auth, restaurant, menu, order,
//! cart, delivery, payment and notification services.
//!
//! # Architecture Overview
//!
//! ```text
//!                   ┌──────────────────────────────────────────────────────────┐
//!                   │                         GATEWAY                          │
//!                   │                                                          │
//!   Client Request  │  ┌──────────┐   ┌──────────────────────┐   ┌──────────┐  │
//!   ────────────────┼─▶│ request  │──▶│ security pipeline    │──▶│ registry │  │
//!                   │  │ id/trace │   │ headers, CORS, url,  │   │ (prefix) │  │
//!                   │  └──────────┘   │ rate limit           │   └────┬─────┘  │
//!                   │                 └──────────────────────┘        │        │
//!                   │                                                 ▼        │
//!   Client Response │  ┌──────────┐                           ┌────────────┐   │
//!   ◀───────────────┼──│  error   │◀──────────────────────────│ dispatcher │◀──┼── Backend
//!                   │  │normalizer│                           │ (allowed   │   │   Service
//!                   │  └──────────┘                           │  hosts)    │   │
//!                   │                                         └────────────┘   │
//!                   └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use food_gateway::config::load_config;
use food_gateway::lifecycle::{spawn_signal_handler, Shutdown};
use food_gateway::observability::{logging, metrics};
use food_gateway::GatewayServer;

#[derive(Parser, Debug)]
#[command(name = "food-gateway", version, about = "API gateway for the food delivery platform")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("food-gateway: {e}");
            std::process::exit(2);
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "food-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        services = config.services.routes.len(),
        cors_origins = ?config.cors.allowed_origins,
        upstream_timeout_secs = config.timeouts.upstream_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(shutdown.clone());

    let server = GatewayServer::new(config)?;
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
