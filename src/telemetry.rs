//! Telemetry metric name constants.
//!
//! Centralised metric names for bifrost operations. The embedding process
//! installs its own `metrics` recorder (e.g. prometheus); without a recorder
//! installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `bifrost_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `resolver`: resolver name (e.g. "api")
//! - `status`: outcome: "ok", "missing" or "error"

/// Cache lookups answered from an entry that was already resolved
/// (fresh, or stale with a refresh scheduled).
pub const CACHE_HITS_TOTAL: &str = "bifrost_domain_cache_hits_total";

/// Cache lookups that had to wait for a synchronous resolution.
pub const CACHE_MISSES_TOTAL: &str = "bifrost_domain_cache_misses_total";

/// Completed background refreshes.
///
/// Labels: `status`.
pub const REFRESHES_TOTAL: &str = "bifrost_domain_refreshes_total";

/// Completed retrievals (one per retriever call, regardless of attempts).
///
/// Labels: `resolver`, `status`.
pub const RETRIEVALS_TOTAL: &str = "bifrost_domain_retrievals_total";

/// Individual calls made to the resolver, including retries.
///
/// Labels: `resolver`.
pub const RESOLVER_ATTEMPTS_TOTAL: &str = "bifrost_resolver_attempts_total";

/// Wall-clock duration of a retrieval, in seconds.
///
/// Labels: `resolver`.
pub const RETRIEVAL_DURATION_SECONDS: &str = "bifrost_retrieval_duration_seconds";

/// Label value for a lookup outcome.
pub(crate) fn status_label(lookup: &crate::Lookup) -> &'static str {
    match &lookup.result {
        Ok(_) => "ok",
        Err(e) if e.is_domain_missing() => "missing",
        Err(_) => "error",
    }
}
