//! The remote resolver seam.
//!
//! A [`Resolver`] answers "what is served on this hostname?" by asking the
//! control plane. Implementations only need to perform one attempt per call;
//! timeouts, retries and caching are layered on top by
//! [`Retriever`](super::Retriever) and [`Cache`](crate::cache::Cache).
//!
//! # Error contract
//!
//! - Return [`BifrostError::DomainDoesNotExist`](crate::BifrostError::DomainDoesNotExist)
//!   only when the control plane positively confirms the host is unknown.
//! - Every other error is treated as transient: it is retried, and it never
//!   replaces a previously cached good answer.

use async_trait::async_trait;

use crate::Result;
use crate::types::VirtualDomain;

/// A successful answer from a [`Resolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub domain: VirtualDomain,
    /// HTTP status the answer was obtained with.
    pub status: u16,
}

impl Resolved {
    pub fn new(domain: VirtualDomain, status: u16) -> Self {
        Self { domain, status }
    }
}

/// Source of truth for hostname → [`VirtualDomain`] resolution.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolver name for logging/metrics.
    fn name(&self) -> &str;

    /// Resolve one hostname. Performs a single attempt.
    async fn resolve(&self, hostname: &str) -> Result<Resolved>;

    /// Check that the control plane is reachable.
    ///
    /// Default implementation reports healthy.
    async fn status(&self) -> Result<()> {
        Ok(())
    }
}
