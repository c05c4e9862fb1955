//! Bounded, retrying retrieval of a single hostname.
//!
//! [`Retriever`] wraps a [`Resolver`] with two policies:
//!
//! - a fixed number of attempts with a fixed pause between failed attempts
//!   ([`RetrieverConfig::max_retries`], [`RetrieverConfig::interval`]);
//! - an overall deadline ([`RetrieverConfig::timeout`]) after which the
//!   caller gets a [`BifrostError::Timeout`] right away.
//!
//! Every error is retried except [`BifrostError::DomainDoesNotExist`]: a
//! hostname the control plane has disowned ends the loop after the attempt
//! that reported it, instead of spending the rest of the budget on it like
//! a retry-on-any-error policy would.
//!
//! The attempt loop runs on its own task. When the deadline passes the loop
//! is abandoned rather than cancelled: an in-flight call is left to finish
//! on its own and its answer is discarded, and no further attempts are
//! started.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::traits::Resolver;
use crate::BifrostError;
use crate::telemetry;
use crate::types::Lookup;

/// Configuration for retrieval timeouts and retries.
///
/// ```rust
/// # use bifrost::RetrieverConfig;
/// # use std::time::Duration;
/// let config = RetrieverConfig::new()
///     .timeout(Duration::from_secs(5))
///     .interval(Duration::from_millis(200))
///     .max_retries(5);
/// assert_eq!(config.max_retries, 5);
/// ```
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Maximum time a caller waits for one retrieval. Default: 30s.
    pub timeout: Duration,
    /// Pause between failed attempts. Default: 1s.
    pub interval: Duration,
    /// Maximum number of attempts (including the first). Default: 3.
    pub max_retries: u32,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_secs(1),
            max_retries: 3,
        }
    }
}

impl RetrieverConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the overall retrieval deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the pause between failed attempts.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the maximum number of attempts. Zero is treated as one.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }
}

/// Performs resolver calls with a deadline and fixed backoff.
pub struct Retriever {
    resolver: Arc<dyn Resolver>,
    config: RetrieverConfig,
}

impl Retriever {
    pub fn new(resolver: Arc<dyn Resolver>, config: RetrieverConfig) -> Self {
        Self { resolver, config }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.resolver
    }

    /// Retrieve the lookup for `hostname`.
    ///
    /// Always produces a [`Lookup`]; failures are carried inside it. Returns
    /// no later than the configured timeout.
    pub async fn retrieve(&self, hostname: &str) -> Lookup {
        let started = Instant::now();
        let deadline = started + self.config.timeout;
        let last_error = Arc::new(Mutex::new(None));

        let attempts = tokio::spawn(resolve_with_backoff(
            Arc::clone(&self.resolver),
            hostname.to_owned(),
            self.config.clone(),
            deadline,
            Arc::clone(&last_error),
        ));

        // Dropping the handle on timeout detaches the attempt loop.
        let lookup = match tokio::time::timeout_at(deadline, attempts).await {
            Ok(Ok(lookup)) => lookup,
            Ok(Err(e)) => Lookup::failed(
                hostname,
                BifrostError::Unavailable(format!("resolver task failed: {e}")),
            ),
            Err(_) => {
                let last_error = last_error.lock().clone();
                warn!(
                    hostname,
                    resolver = self.resolver.name(),
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    last_error = last_error.as_deref().unwrap_or("none"),
                    "retrieval timed out"
                );
                Lookup::failed(
                    hostname,
                    BifrostError::Timeout {
                        after: self.config.timeout,
                        last_error,
                    },
                )
            }
        };

        metrics::counter!(telemetry::RETRIEVALS_TOTAL,
            "resolver" => self.resolver.name().to_owned(),
            "status" => telemetry::status_label(&lookup),
        )
        .increment(1);
        metrics::histogram!(telemetry::RETRIEVAL_DURATION_SECONDS,
            "resolver" => self.resolver.name().to_owned(),
        )
        .record(started.elapsed().as_secs_f64());

        lookup
    }
}

async fn resolve_with_backoff(
    resolver: Arc<dyn Resolver>,
    hostname: String,
    config: RetrieverConfig,
    deadline: Instant,
    last_error: Arc<Mutex<Option<String>>>,
) -> Lookup {
    let max_attempts = config.max_retries.max(1);
    let mut attempt = 1;

    loop {
        metrics::counter!(telemetry::RESOLVER_ATTEMPTS_TOTAL,
            "resolver" => resolver.name().to_owned(),
        )
        .increment(1);

        let err = match resolver.resolve(&hostname).await {
            Ok(resolved) => {
                let mut domain = resolved.domain;
                domain.sort_lookup_paths();
                return Lookup::resolved(hostname, resolved.status, Arc::new(domain));
            }
            // Not retried.
            Err(e) if e.is_domain_missing() => return Lookup::failed(hostname, e),
            Err(e) => e,
        };

        *last_error.lock() = Some(err.to_string());

        if attempt >= max_attempts {
            debug!(hostname = %hostname, attempts = attempt, error = %err, "retry budget exhausted");
            return Lookup::failed(hostname, err);
        }
        warn!(
            hostname = %hostname,
            resolver = resolver.name(),
            attempt,
            max_attempts,
            delay_ms = config.interval.as_millis() as u64,
            error = %err,
            "retrying after resolver error"
        );
        tokio::time::sleep(config.interval).await;

        // The caller has already been answered with a timeout.
        if Instant::now() >= deadline {
            debug!(hostname = %hostname, attempt, error = %err, "deadline passed, abandoning retries");
            return Lookup::failed(hostname, err);
        }
        attempt += 1;
    }
}
