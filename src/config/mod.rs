//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults (schema.rs)
//!     → optional TOML file (loader.rs)
//!     → environment overrides: CLIENT_URL, PORT, *_SERVICE_URL (loader.rs)
//!     → validation.rs (semantic checks, all errors at once)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all pipeline stages
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    CorsConfig, GatewayConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    RateLimitClassConfig, RateLimitConfig, SecurityConfig, ServiceConfig, ServicesConfig,
    TimeoutConfig,
};
