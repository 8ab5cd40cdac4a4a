//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap backend calls with a deadline
//! - Cancel the in-flight call cleanly on expiry
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - The deadline covers connect plus time-to-response-headers; a streaming
//!   body that already started is not cut off
//! - Timed-out requests return 504 Gateway Timeout, transport failures 502

use std::error::Error;
use std::future::Future;
use std::time::Duration;

use crate::error::GatewayError;

/// Run an upstream call under `timeout`, mapping both failure modes to
/// gateway errors tagged with the service name.
///
/// Dropping the inner future on expiry aborts the backend request.
pub async fn with_deadline<F, T, E>(
    service: &str,
    timeout: Duration,
    call: F,
) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<Box<dyn Error + Send + Sync>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(GatewayError::UpstreamUnavailable {
            service: service.to_string(),
            source: e.into(),
        }),
        Err(_) => Err(GatewayError::UpstreamTimeout {
            service: service.to_string(),
            timeout,
        }),
    }
}
