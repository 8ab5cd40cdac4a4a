//! Configuration loading from disk and environment.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("PORT `{0}` is not a valid port number")]
    Port(String),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid header value: {0}")]
    Header(#[from] axum::http::header::InvalidHeaderValue),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, override from the process environment, and validate.
///
/// Without a path the built-in defaults are used as the base layer.
pub fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => GatewayConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `CLIENT_URL`, `PORT` and the per-service URL variables.
///
/// `lookup` abstracts the environment so tests do not touch process state.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(origin) = lookup("CLIENT_URL").filter(|v| !v.is_empty()) {
        config.cors.allowed_origins = vec![origin];
    }

    if let Some(port) = lookup("PORT").filter(|v| !v.is_empty()) {
        let port: u16 = port.parse().map_err(|_| ConfigError::Port(port.clone()))?;
        config.listener.bind_address = match config.listener.bind_address.parse::<SocketAddr>() {
            Ok(mut addr) => {
                addr.set_port(port);
                addr.to_string()
            }
            Err(_) => format!("0.0.0.0:{}", port),
        };
    }

    for service in &mut config.services.routes {
        let Some(var) = service.url_env.as_deref() else {
            continue;
        };
        if let Some(url) = lookup(var).filter(|v| !v.is_empty()) {
            tracing::debug!(service = %service.name, env = %var, "Service URL taken from environment");
            service.url = url;
        }
    }

    Ok(())
}
