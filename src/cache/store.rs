//! Concurrent map of hostname → [`Entry`].
//!
//! Lookups of existing entries go straight to the moka map. Creation and
//! replacement are serialized by one mutex and re-check the map under it,
//! so two callers racing on a new hostname always get the same entry.
//!
//! Entries untouched for the housekeeping TTL are evicted by moka. That TTL
//! is unrelated to the refresh and expiry timeouts, which only decide how a
//! present entry is served.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use parking_lot::Mutex;
use tracing::debug;

use super::entry::Entry;
use super::CacheConfig;

/// Hostname-keyed entry store.
pub struct Store {
    entries: Cache<String, Arc<Entry>>,
    create: Mutex<()>,
    refresh_timeout: Duration,
    expiration_timeout: Duration,
}

impl Store {
    pub fn new(config: &CacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_idle(config.housekeeping_ttl)
            .eviction_listener(|hostname: Arc<String>, _entry, cause| {
                if cause.was_evicted() {
                    debug!(hostname = %hostname, ?cause, "cache entry evicted");
                }
            })
            .build();

        Self {
            entries,
            create: Mutex::new(()),
            refresh_timeout: config.refresh_timeout,
            expiration_timeout: config.expiration_timeout,
        }
    }

    /// Existing entry for `hostname`, if any. Never creates.
    pub fn get(&self, hostname: &str) -> Option<Arc<Entry>> {
        self.entries.get(hostname)
    }

    /// Existing entry for `hostname`, or a new empty one.
    pub fn load_or_create(&self, hostname: &str) -> Arc<Entry> {
        if let Some(entry) = self.entries.get(hostname) {
            return entry;
        }

        let _guard = self.create.lock();
        if let Some(entry) = self.entries.get(hostname) {
            return entry;
        }
        self.insert_new(hostname)
    }

    /// Unconditionally install a new empty entry for `hostname`.
    ///
    /// Callers still holding the previous entry keep using it; only later
    /// lookups see the replacement.
    pub fn replace_or_create(&self, hostname: &str) -> Arc<Entry> {
        let _guard = self.create.lock();
        self.insert_new(hostname)
    }

    /// Replace `current` with a new empty entry, unless another caller has
    /// already replaced it, in which case that replacement is returned.
    pub fn replace_if_current(&self, hostname: &str, current: &Arc<Entry>) -> Arc<Entry> {
        let _guard = self.create.lock();
        match self.entries.get(hostname) {
            Some(entry) if !Arc::ptr_eq(&entry, current) => entry,
            _ => self.insert_new(hostname),
        }
    }

    /// Number of stored entries, after applying pending evictions.
    pub fn len(&self) -> u64 {
        self.entries.run_pending_tasks();
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_new(&self, hostname: &str) -> Arc<Entry> {
        let entry = Arc::new(Entry::new(
            hostname,
            self.refresh_timeout,
            self.expiration_timeout,
        ));
        self.entries.insert(hostname.to_owned(), Arc::clone(&entry));
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EntryState;

    fn store() -> Store {
        Store::new(&CacheConfig::default())
    }

    #[test]
    fn load_or_create_returns_same_entry() {
        let store = store();
        let first = store.load_or_create("a.example.com");
        let second = store.load_or_create("a.example.com");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.domain(), "a.example.com");
        assert_eq!(first.state(), EntryState::Empty);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn distinct_hosts_get_distinct_entries() {
        let store = store();
        let a = store.load_or_create("a.example.com");
        let b = store.load_or_create("b.example.com");
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn get_never_creates() {
        let store = store();
        assert!(store.get("a.example.com").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn replace_or_create_swaps_entry() {
        let store = store();
        let old = store.load_or_create("a.example.com");
        let new = store.replace_or_create("a.example.com");
        assert!(!Arc::ptr_eq(&old, &new));
        assert!(Arc::ptr_eq(&new, &store.load_or_create("a.example.com")));
    }

    #[test]
    fn replace_or_create_creates_when_absent() {
        let store = store();
        let entry = store.replace_or_create("a.example.com");
        assert!(Arc::ptr_eq(&entry, &store.get("a.example.com").unwrap()));
    }

    #[test]
    fn replacement_is_not_logged_as_eviction() {
        use moka::notification::RemovalCause;

        let store = store();
        store.load_or_create("a.example.com");
        store.replace_or_create("a.example.com");
        store.entries.run_pending_tasks();

        assert!(!RemovalCause::Replaced.was_evicted());
        assert!(RemovalCause::Expired.was_evicted());
        assert!(RemovalCause::Size.was_evicted());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn replace_if_current_replaces_once() {
        let store = store();
        let stale = store.load_or_create("a.example.com");

        let first = store.replace_if_current("a.example.com", &stale);
        assert!(!Arc::ptr_eq(&first, &stale));

        // A second caller holding the same old entry gets the first replacement.
        let second = store.replace_if_current("a.example.com", &stale);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn concurrent_creation_yields_one_entry() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.load_or_create("a.example.com"))
            })
            .collect();

        let entries: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(entries.iter().all(|e| Arc::ptr_eq(e, &entries[0])));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn idle_entries_are_evicted() {
        let store = Store::new(&CacheConfig::default().housekeeping_ttl(Duration::from_millis(50)));
        store.load_or_create("a.example.com");
        std::thread::sleep(Duration::from_millis(150));
        assert!(store.get("a.example.com").is_none());
        assert_eq!(store.len(), 0);
    }
}
