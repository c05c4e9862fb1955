//! Hostname resolution against the control plane.
//!
//! - [`Resolver`]: one attempt at resolving one hostname.
//! - [`ApiResolver`]: the control-plane HTTP API implementation.
//! - [`Retriever`]: deadline + fixed-backoff retries around a resolver.
//! - [`poll_status()`]: startup reachability check.

pub mod api;
pub mod retriever;
pub mod traits;

pub use api::{ApiConfig, ApiResolver};
pub use retriever::{Retriever, RetrieverConfig};
pub use traits::{Resolved, Resolver};

use std::time::Duration;

use tracing::{info, warn};

use crate::{BifrostError, Result};

/// Default number of extra status polls made at startup.
pub const DEFAULT_POLLING_MAX_RETRIES: u32 = 10;

/// Default pause between status polls.
pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(10);

/// Check the control plane is reachable: one status call plus up to
/// `retries` more, pausing `interval` after each failure.
pub async fn poll_status(resolver: &dyn Resolver, retries: u32, interval: Duration) -> Result<()> {
    let mut last_err = None;

    for attempt in 0..=retries {
        info!(resolver = resolver.name(), attempt = attempt + 1, "polling control-plane status");
        match resolver.status().await {
            Ok(()) => {
                info!(resolver = resolver.name(), "control-plane API connected successfully");
                return Ok(());
            }
            Err(e) => {
                warn!(resolver = resolver.name(), attempt = attempt + 1, error = %e, "control-plane status check failed");
                last_err = Some(e);
            }
        }
        if attempt < retries {
            tokio::time::sleep(interval).await;
        }
    }

    Err(BifrostError::Unavailable(format!(
        "polling failed after {} tries every {:?}: {}",
        retries + 1,
        interval,
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}
