//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to backend:
//!     → timeouts.rs (enforce the upstream deadline)
//!     → On expiry: 504, on transport failure: 502
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - No retries: non-idempotent calls (login, payment) must not be replayed
//!   by the gateway

pub mod timeouts;

pub use timeouts::with_deadline;
