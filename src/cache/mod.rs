//! Domain resolution cache.
//!
//! [`Cache`] sits between request handling and the control plane. For each
//! hostname it keeps one [`Entry`] and serves from it according to the
//! entry's [`EntryState`]:
//!
//! - **Fresh**: return the cached lookup.
//! - **Stale**: return the cached lookup and start a background refresh.
//! - **Expired**: replace the entry, then treat it as empty.
//! - **Empty**: wait for a single shared retrieval.
//!
//! Only the first request for a hostname (or the first after expiry) ever
//! waits on the network. Every concurrent caller for that hostname shares
//! the one in-flight retrieval.

pub mod entry;
pub mod store;

pub use entry::{Entry, EntryState, RefreshOutcome};
pub use store::Store;

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::BifrostError;
use crate::resolver::{Resolver, Retriever, RetrieverConfig};
use crate::routing::normalize_host;
use crate::telemetry;
use crate::types::Lookup;

/// Configuration for the domain cache.
///
/// ```rust
/// # use bifrost::{CacheConfig, RetrieverConfig};
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .refresh_timeout(Duration::from_secs(30))
///     .expiration_timeout(Duration::from_secs(300))
///     .retriever(RetrieverConfig::new().max_retries(5));
/// assert_eq!(config.max_entries, 100_000);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Age after which an entry is served stale and refreshed. Default: 60s.
    pub refresh_timeout: Duration,
    /// Age after which an entry is no longer served. Default: 10 minutes.
    pub expiration_timeout: Duration,
    /// Idle time after which an entry is dropped from the store. Default: 1 hour.
    pub housekeeping_ttl: Duration,
    /// Maximum number of stored entries. Default: 100,000.
    pub max_entries: u64,
    /// Retrieval timeout and retry policy.
    pub retriever: RetrieverConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_timeout: Duration::from_secs(60),
            expiration_timeout: Duration::from_secs(600),
            housekeeping_ttl: Duration::from_secs(3600),
            max_entries: 100_000,
            retriever: RetrieverConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn expiration_timeout(mut self, timeout: Duration) -> Self {
        self.expiration_timeout = timeout;
        self
    }

    pub fn housekeeping_ttl(mut self, ttl: Duration) -> Self {
        self.housekeeping_ttl = ttl;
        self
    }

    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    pub fn retriever(mut self, retriever: RetrieverConfig) -> Self {
        self.retriever = retriever;
        self
    }
}

/// Fresh/stale cache of hostname lookups in front of a [`Resolver`].
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use bifrost::{ApiConfig, ApiResolver, Cache, CacheConfig};
///
/// # async fn example() -> bifrost::Result<()> {
/// let resolver = ApiResolver::new(ApiConfig::new("https://control.example.internal", "s3cret"))?;
/// let cache = Cache::new(Arc::new(resolver), CacheConfig::default());
///
/// let lookup = cache.resolve("group.pages.example.com").await;
/// if let Some(domain) = lookup.domain() {
///     println!("{} projects", domain.lookup_paths.len());
/// }
/// # Ok(())
/// # }
/// ```
pub struct Cache {
    store: Store,
    retriever: Arc<Retriever>,
}

impl Cache {
    pub fn new(resolver: Arc<dyn Resolver>, config: CacheConfig) -> Self {
        Self {
            store: Store::new(&config),
            retriever: Arc::new(Retriever::new(resolver, config.retriever)),
        }
    }

    /// Resolve `hostname`, serving from the cache whenever possible.
    ///
    /// Hostnames are matched case-insensitively and without port. Returns
    /// without waiting on the network unless the entry is empty or expired.
    pub async fn resolve(&self, hostname: &str) -> Lookup {
        let hostname = normalize_host(hostname);
        if hostname.is_empty() {
            return Lookup::failed(hostname, BifrostError::InvalidInput("empty hostname".to_string()));
        }

        let mut entry = self.store.load_or_create(&hostname);
        if entry.is_expired() {
            debug!(hostname = %hostname, "cache entry expired, replacing");
            entry = self.store.replace_if_current(&hostname, &entry);
        }

        match entry.state() {
            EntryState::Fresh => {
                if let Some(lookup) = entry.lookup() {
                    metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                    return lookup;
                }
            }
            EntryState::Stale => {
                if let Some(lookup) = entry.lookup() {
                    metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                    if entry.refresh(&self.retriever) {
                        debug!(hostname = %hostname, "background refresh started");
                    }
                    return lookup;
                }
            }
            EntryState::Empty | EntryState::Expired => {}
        }

        metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
        entry.retrieve(&self.retriever).await
    }

    /// Drop whatever is cached for `hostname`; the next request resolves it
    /// again. Requests already holding the old entry are unaffected.
    pub fn purge(&self, hostname: &str) {
        let hostname = normalize_host(hostname);
        if hostname.is_empty() {
            return;
        }
        debug!(hostname = %hostname, "purging cache entry");
        self.store.replace_or_create(&hostname);
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }
}
