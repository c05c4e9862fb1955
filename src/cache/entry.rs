//! Per-hostname cache record.
//!
//! An [`Entry`] moves through these states:
//!
//! | State | Condition |
//! |---|---|
//! | [`Empty`](EntryState::Empty) | never resolved |
//! | [`Fresh`](EntryState::Fresh) | resolved, younger than `refresh_timeout` |
//! | [`Stale`](EntryState::Stale) | resolved, older than `refresh_timeout`, or holding a timeout |
//! | [`Expired`](EntryState::Expired) | resolved, older than `expiration_timeout` |
//!
//! Age is measured from the last successful refresh, or from creation when
//! the entry was never refreshed.
//!
//! At most one retrieval and at most one refresh are ever in flight per
//! entry. Both run on detached tasks and publish by writing the entry under
//! its own lock, so a caller that goes away never strands the others.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::BifrostError;
use crate::resolver::Retriever;
use crate::telemetry;
use crate::types::Lookup;

/// Observable state of an [`Entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// No resolution has completed yet; callers must wait for one.
    Empty,
    /// Serve the cached lookup, no network action.
    Fresh,
    /// Serve the cached lookup and refresh it in the background.
    Stale,
    /// Too old to serve; the entry must be replaced and re-resolved.
    Expired,
}

/// What a completed refresh did to the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The new lookup replaced the cached one.
    Updated,
    /// The refresh failed transiently; the previous good lookup was kept.
    KeptPrevious,
}

#[derive(Debug)]
struct Inner {
    created: Instant,
    refreshed: Option<Instant>,
    response: Option<Lookup>,
}

impl Inner {
    fn last_timestamp(&self) -> Instant {
        self.refreshed.unwrap_or(self.created)
    }

    fn state(&self, refresh_timeout: Duration, expiration_timeout: Duration) -> EntryState {
        let Some(response) = &self.response else {
            return EntryState::Empty;
        };

        let age = self.last_timestamp().elapsed();
        if age > expiration_timeout {
            EntryState::Expired
        } else if age > refresh_timeout || response.timed_out() {
            EntryState::Stale
        } else {
            EntryState::Fresh
        }
    }
}

/// Cache record for one hostname.
///
/// Created empty by the [`Store`](super::Store) and mutated in place by
/// [`retrieve()`](Self::retrieve) and [`refresh()`](Self::refresh).
#[derive(Debug)]
pub struct Entry {
    domain: String,
    refresh_timeout: Duration,
    expiration_timeout: Duration,
    inner: RwLock<Inner>,
    retrieving: AtomicBool,
    refreshing: AtomicBool,
    retrieved: watch::Sender<bool>,
}

impl Entry {
    pub fn new(
        domain: impl Into<String>,
        refresh_timeout: Duration,
        expiration_timeout: Duration,
    ) -> Self {
        let (retrieved, _) = watch::channel(false);
        Self {
            domain: domain.into(),
            refresh_timeout,
            expiration_timeout,
            inner: RwLock::new(Inner {
                created: Instant::now(),
                refreshed: None,
                response: None,
            }),
            retrieving: AtomicBool::new(false),
            refreshing: AtomicBool::new(false),
            retrieved,
        }
    }

    /// Hostname this entry caches.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn state(&self) -> EntryState {
        self.inner
            .read()
            .state(self.refresh_timeout, self.expiration_timeout)
    }

    /// Resolved and young enough to serve without any network action.
    pub fn is_up_to_date(&self) -> bool {
        self.state() == EntryState::Fresh
    }

    /// Resolved, still servable, but due for a background refresh.
    pub fn needs_refresh(&self) -> bool {
        self.state() == EntryState::Stale
    }

    /// Resolved too long ago to be served at all.
    pub fn is_expired(&self) -> bool {
        self.state() == EntryState::Expired
    }

    /// Holds a lookup that failed for a reason other than permanent absence.
    pub fn has_temporary_error(&self) -> bool {
        self.inner
            .read()
            .response
            .as_ref()
            .is_some_and(Lookup::has_temporary_error)
    }

    /// Whether a background refresh is currently running.
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Current cached lookup, `None` until the first resolution completes.
    ///
    /// Only takes the entry's read lock.
    pub fn lookup(&self) -> Option<Lookup> {
        self.inner.read().response.clone()
    }

    /// Resolve an empty entry, waiting for the result.
    ///
    /// The first caller starts the retrieval on a detached task; every
    /// concurrent caller (including the first) waits for that single
    /// retrieval and receives the same lookup. Waiting is bounded by the
    /// retriever's timeout. If the entry is already resolved this returns
    /// the cached lookup immediately.
    pub async fn retrieve(self: &Arc<Self>, retriever: &Arc<Retriever>) -> Lookup {
        let mut retrieved = self.retrieved.subscribe();

        if self
            .retrieving
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let entry = Arc::clone(self);
            let retriever = Arc::clone(retriever);
            tokio::spawn(async move {
                let lookup = retriever.retrieve(&entry.domain).await;
                entry.set_response(lookup);
            });
        }

        // The sender is owned by `self`, so the channel stays open while we wait.
        let _ = retrieved.wait_for(|done| *done).await;

        self.lookup().unwrap_or_else(|| {
            Lookup::failed(
                self.domain.as_str(),
                BifrostError::Unavailable("entry resolved without a response".to_string()),
            )
        })
    }

    /// Refresh a stale entry in the background.
    ///
    /// Returns `true` if this call started a refresh, `false` if one was
    /// already running. Never waits on the refresh; its result becomes
    /// visible through [`lookup()`](Self::lookup) once it completes.
    pub fn refresh(self: &Arc<Self>, retriever: &Arc<Retriever>) -> bool {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let entry = Arc::clone(self);
        let retriever = Arc::clone(retriever);
        tokio::spawn(async move {
            let _guard = RefreshGuard(&entry.refreshing);

            let lookup = retriever.retrieve(&entry.domain).await;
            let status = telemetry::status_label(&lookup);
            let outcome = entry.apply_refresh(lookup);

            metrics::counter!(telemetry::REFRESHES_TOTAL, "status" => status).increment(1);
            debug!(hostname = %entry.domain, status, ?outcome, "refresh completed");
        });

        true
    }

    fn set_response(&self, lookup: Lookup) {
        self.inner.write().response = Some(lookup);
        self.retrieved.send_replace(true);
    }

    /// Write a refresh result back into the entry.
    ///
    /// A transient failure never replaces a previously good lookup; the
    /// entry keeps its old timestamps and stays stale. Permanent absence
    /// and successes always replace.
    fn apply_refresh(&self, lookup: Lookup) -> RefreshOutcome {
        let mut inner = self.inner.write();

        let previous_is_good = inner
            .response
            .as_ref()
            .is_some_and(|previous| previous.domain().is_some());
        if lookup.has_temporary_error() && previous_is_good {
            warn!(
                hostname = %self.domain,
                error = %lookup.error().map(ToString::to_string).unwrap_or_default(),
                "refresh failed, serving previous lookup"
            );
            return RefreshOutcome::KeptPrevious;
        }

        inner.response = Some(lookup);
        inner.refreshed = Some(Instant::now());
        RefreshOutcome::Updated
    }

    /// Pretend the entry was created and last refreshed `age` ago.
    #[cfg(test)]
    pub(crate) fn backdate(&self, age: Duration) {
        let mut inner = self.inner.write();
        let now = Instant::now();
        let then = now.checked_sub(age).unwrap_or(now);
        inner.created = then;
        if inner.refreshed.is_some() {
            inner.refreshed = Some(then);
        }
    }
}

/// Clears the refresh flag when the refresh task ends, however it ends.
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use crate::resolver::{Resolved, Resolver, RetrieverConfig};
    use crate::types::{LookupPath, Source, VirtualDomain};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;

    const REFRESH: Duration = Duration::from_secs(60);
    const EXPIRY: Duration = Duration::from_secs(600);

    /// Resolver answering from a script, repeating the last answer.
    struct Scripted {
        answers: parking_lot::Mutex<VecDeque<Result<Resolved>>>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn new(answers: Vec<Result<Resolved>>) -> Arc<Self> {
            Arc::new(Self {
                answers: parking_lot::Mutex::new(answers.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Resolver for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn resolve(&self, _hostname: &str) -> Result<Resolved> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut answers = self.answers.lock();
            if answers.len() > 1 {
                answers.pop_front().unwrap()
            } else {
                answers.front().cloned().unwrap()
            }
        }
    }

    fn project(id: u64) -> Resolved {
        Resolved::new(
            VirtualDomain::new(vec![LookupPath::new(id, "/", Source::file("public"))]),
            200,
        )
    }

    fn retriever(resolver: Arc<Scripted>) -> Arc<Retriever> {
        Arc::new(Retriever::new(
            resolver,
            RetrieverConfig::new()
                .max_retries(1)
                .interval(Duration::from_millis(1))
                .timeout(Duration::from_secs(5)),
        ))
    }

    fn entry() -> Arc<Entry> {
        Arc::new(Entry::new("my.pages.example.com", REFRESH, EXPIRY))
    }

    async fn wait_for_refresh(entry: &Entry) {
        while entry.is_refreshing() {
            tokio::task::yield_now().await;
        }
    }

    fn project_id(lookup: &Lookup) -> u64 {
        lookup.domain().unwrap().lookup_paths[0].project_id
    }

    #[test]
    fn state_table() {
        struct Case {
            name: &'static str,
            resolved: bool,
            age: Duration,
            expected: EntryState,
        }
        let cases = [
            Case {
                name: "empty",
                resolved: false,
                age: Duration::ZERO,
                expected: EntryState::Empty,
            },
            Case {
                name: "empty_and_old",
                resolved: false,
                age: Duration::from_secs(3600),
                expected: EntryState::Empty,
            },
            Case {
                name: "fresh",
                resolved: true,
                age: Duration::ZERO,
                expected: EntryState::Fresh,
            },
            Case {
                name: "stale",
                resolved: true,
                age: Duration::from_secs(120),
                expected: EntryState::Stale,
            },
            Case {
                name: "expired",
                resolved: true,
                age: Duration::from_secs(3600),
                expected: EntryState::Expired,
            },
        ];

        for case in cases {
            let entry = Entry::new("my.pages.example.com", REFRESH, EXPIRY);
            if case.resolved {
                entry.set_response(Lookup::resolved(
                    "my.pages.example.com",
                    200,
                    Arc::new(VirtualDomain::default()),
                ));
            }
            entry.backdate(case.age);

            assert_eq!(entry.state(), case.expected, "{}", case.name);
            assert_eq!(
                entry.is_up_to_date(),
                case.expected == EntryState::Fresh,
                "{}",
                case.name
            );
            assert_eq!(
                entry.needs_refresh(),
                case.expected == EntryState::Stale,
                "{}",
                case.name
            );
        }
    }

    #[test]
    fn timed_out_lookup_is_never_fresh() {
        let entry = Entry::new("my.pages.example.com", REFRESH, EXPIRY);
        entry.set_response(Lookup::failed(
            "my.pages.example.com",
            BifrostError::Timeout {
                after: Duration::from_secs(30),
                last_error: None,
            },
        ));
        assert_eq!(entry.state(), EntryState::Stale);
        assert!(entry.has_temporary_error());
    }

    #[test]
    fn missing_domain_is_not_a_temporary_error() {
        let entry = Entry::new("gone.example.com", REFRESH, EXPIRY);
        entry.set_response(Lookup::failed("gone.example.com", BifrostError::DomainDoesNotExist));
        assert!(!entry.has_temporary_error());
        assert!(entry.is_up_to_date());
    }

    #[tokio::test]
    async fn retrieve_publishes_response() {
        let resolver = Scripted::new(vec![Ok(project(1))]);
        let entry = entry();

        let lookup = entry.retrieve(&retriever(resolver.clone())).await;

        assert_eq!(project_id(&lookup), 1);
        assert_eq!(lookup.status, Some(200));
        assert!(entry.is_up_to_date());
        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn retrieve_on_resolved_entry_does_not_call_resolver_again() {
        let resolver = Scripted::new(vec![Ok(project(1))]);
        let retriever = retriever(resolver.clone());
        let entry = entry();

        entry.retrieve(&retriever).await;
        entry.retrieve(&retriever).await;

        assert_eq!(resolver.calls(), 1);
    }

    #[tokio::test]
    async fn refresh_replaces_lookup_and_timestamp() {
        let resolver = Scripted::new(vec![Ok(project(1)), Ok(project(2))]);
        let retriever = retriever(resolver.clone());
        let entry = entry();

        entry.retrieve(&retriever).await;
        entry.backdate(Duration::from_secs(120));
        assert!(entry.needs_refresh());

        assert!(entry.refresh(&retriever));
        wait_for_refresh(&entry).await;

        assert_eq!(project_id(&entry.lookup().unwrap()), 2);
        assert!(entry.is_up_to_date());
        assert_eq!(resolver.calls(), 2);
    }

    #[tokio::test]
    async fn refresh_with_temporary_error_keeps_previous_lookup() {
        let resolver = Scripted::new(vec![
            Ok(project(1)),
            Err(BifrostError::Http("connection reset".into())),
        ]);
        let retriever = retriever(resolver.clone());
        let entry = entry();

        entry.retrieve(&retriever).await;
        entry.backdate(Duration::from_secs(120));

        entry.refresh(&retriever);
        wait_for_refresh(&entry).await;

        let lookup = entry.lookup().unwrap();
        assert!(lookup.error().is_none(), "previous good lookup should be kept");
        assert_eq!(project_id(&lookup), 1);
        // Still stale, so the next access can try again.
        assert!(entry.needs_refresh());
        assert!(entry.refresh(&retriever));
    }

    #[tokio::test]
    async fn refresh_with_missing_domain_overwrites_previous_lookup() {
        let resolver = Scripted::new(vec![Ok(project(1)), Err(BifrostError::DomainDoesNotExist)]);
        let retriever = retriever(resolver.clone());
        let entry = entry();

        entry.retrieve(&retriever).await;
        entry.backdate(Duration::from_secs(120));

        entry.refresh(&retriever);
        wait_for_refresh(&entry).await;

        let lookup = entry.lookup().unwrap();
        assert!(lookup.is_domain_missing());
        assert!(entry.is_up_to_date());
    }

    #[tokio::test]
    async fn refresh_of_errored_entry_stores_new_error() {
        let resolver = Scripted::new(vec![
            Err(BifrostError::Http("first".into())),
            Err(BifrostError::Http("second".into())),
        ]);
        let retriever = retriever(resolver.clone());
        let entry = entry();

        let lookup = entry.retrieve(&retriever).await;
        assert!(lookup.has_temporary_error());
        entry.backdate(Duration::from_secs(120));

        entry.refresh(&retriever);
        wait_for_refresh(&entry).await;

        let lookup = entry.lookup().unwrap();
        assert_eq!(lookup.error(), Some(&BifrostError::Http("second".into())));
        assert!(entry.is_up_to_date());
    }

    #[tokio::test]
    async fn second_refresh_is_rejected_while_one_is_running() {
        let resolver = Scripted::new(vec![Ok(project(1))]);
        let retriever = retriever(resolver.clone());
        let entry = entry();

        entry.retrieve(&retriever).await;
        entry.backdate(Duration::from_secs(120));

        assert!(entry.refresh(&retriever));
        assert!(!entry.refresh(&retriever));
        assert!(!entry.refresh(&retriever));
        wait_for_refresh(&entry).await;

        assert_eq!(resolver.calls(), 2);
    }
}
