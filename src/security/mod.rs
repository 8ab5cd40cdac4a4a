//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → headers.rs (decorate every response, strip fingerprinting)
//!     → path_guard.rs (refuse `.` and `..` path segments)
//!     → cors.rs (origin allow-list, preflight)
//!     → url_guard.rs (client-supplied `url` checked by ssrf.rs)
//!     → rate_limit.rs (fixed-window counters per client and class)
//!     → Pass to routing
//!
//! Before dispatch:
//!     → ssrf.rs (target host must be a configured backend)
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Fail closed: reject on any security check failure
//! - No trust in client input

pub mod cors;
pub mod headers;
pub mod path_guard;
pub mod rate_limit;
pub mod ssrf;
pub mod url_guard;
