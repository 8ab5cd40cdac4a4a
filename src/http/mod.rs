//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, connect info, graceful shutdown)
//!     → pipeline.rs (request ID, trace, metrics, headers, panic catch,
//!                    path guard, CORS, body limit, URL guard, rate limit)
//!     → [routing layer resolves the service]
//!     → proxy.rs (allowed host check, header allow-list, forward)
//!     → response.rs (errors and panics normalized to JSON)
//!     → Send to client
//! ```

pub mod pipeline;
pub mod proxy;
pub mod request;
pub mod response;
pub mod server;

pub use pipeline::Pipeline;
pub use proxy::Dispatcher;
pub use request::X_REQUEST_ID;
pub use server::GatewayServer;
