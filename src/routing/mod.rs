//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (path)
//!     → registry.rs (longest prefix lookup)
//!     → matcher.rs (segment-boundary prefix test)
//!     → Return: ServiceRoute, NoRoute or RouteDisabled
//!
//! Route Compilation (at startup):
//!     ServiceConfig[]
//!     → Validate backend URLs (bad ones become disabled entries)
//!     → Sort by prefix length
//!     → Freeze as immutable ServiceRegistry
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route

pub mod matcher;
pub mod registry;

pub use matcher::PathPrefix;
pub use registry::{ServiceRegistry, ServiceRoute};
