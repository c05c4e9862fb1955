//! Bifrost error types

use std::time::Duration;

/// Bifrost error types.
///
/// Errors are `Clone` because a single resolution result is shared by every
/// caller waiting on the same cache entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BifrostError {
    // Resolution outcomes
    /// The control plane confirmed that it has no configuration for the host.
    ///
    /// This is the only error that is treated as permanent absence.
    #[error("domain does not exist")]
    DomainDoesNotExist,

    #[error("retrieval timed out after {after:?}{}", last_error_suffix(.last_error))]
    Timeout {
        after: Duration,
        last_error: Option<String>,
    },

    // Control-plane/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("control-plane API rejected credentials")]
    Unauthorized,

    #[error("control-plane API unavailable: {0}")]
    Unavailable(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

fn last_error_suffix(last_error: &Option<String>) -> String {
    match last_error {
        Some(e) => format!(" (last error: {e})"),
        None => String::new(),
    }
}

impl BifrostError {
    /// Whether the control plane reported that the host is unknown.
    pub fn is_domain_missing(&self) -> bool {
        matches!(self, BifrostError::DomainDoesNotExist)
    }

    /// Whether this error may go away on its own and must never overwrite a
    /// previously cached good value.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BifrostError::Timeout { .. }
                | BifrostError::Http(_)
                | BifrostError::Api { .. }
                | BifrostError::Unauthorized
                | BifrostError::Unavailable(_)
                | BifrostError::Json(_)
        )
    }

    /// Whether the retrieval budget was exhausted before an answer arrived.
    pub fn is_timeout(&self) -> bool {
        matches!(self, BifrostError::Timeout { .. })
    }

    /// HTTP status associated with the error, when one is known.
    pub fn status(&self) -> Option<u16> {
        match self {
            BifrostError::DomainDoesNotExist => Some(204),
            BifrostError::Api { status, .. } => Some(*status),
            BifrostError::Unauthorized => Some(401),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for BifrostError {
    fn from(err: serde_json::Error) -> Self {
        BifrostError::Json(err.to_string())
    }
}

impl From<reqwest::Error> for BifrostError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BifrostError::Json(err.to_string())
        } else {
            BifrostError::Http(err.to_string())
        }
    }
}

/// Result type alias for Bifrost operations
pub type Result<T> = std::result::Result<T, BifrostError>;
