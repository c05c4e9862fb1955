//! The cache's unit of record.

use std::sync::Arc;

use super::VirtualDomain;
use crate::BifrostError;

/// Outcome of one resolution of a hostname.
///
/// Cheap to clone: the resolved domain sits behind an `Arc`, so every caller
/// served from the same cache entry shares one allocation.
#[derive(Debug, Clone)]
pub struct Lookup {
    /// Hostname this lookup was made for.
    pub name: String,
    /// HTTP status the control plane answered with, when known.
    pub status: Option<u16>,
    /// The resolved domain or the reason resolution failed.
    pub result: Result<Arc<VirtualDomain>, BifrostError>,
}

/// How downstream request handling should respond to a [`Lookup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// A domain is available; match the request path against it.
    Serve,
    /// The control plane has no such domain; render a not-found page.
    NotFound,
    /// The control plane could not answer; render a gateway-error page.
    BadGateway,
}

impl Lookup {
    /// A successful lookup.
    pub fn resolved(name: impl Into<String>, status: u16, domain: Arc<VirtualDomain>) -> Self {
        Self {
            name: name.into(),
            status: Some(status),
            result: Ok(domain),
        }
    }

    /// A failed lookup.
    pub fn failed(name: impl Into<String>, error: BifrostError) -> Self {
        Self {
            name: name.into(),
            status: error.status(),
            result: Err(error),
        }
    }

    pub fn domain(&self) -> Option<&Arc<VirtualDomain>> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&BifrostError> {
        self.result.as_ref().err()
    }

    /// Whether the control plane confirmed the host does not exist.
    pub fn is_domain_missing(&self) -> bool {
        self.error().is_some_and(BifrostError::is_domain_missing)
    }

    /// Whether resolution failed for a reason other than permanent absence.
    pub fn has_temporary_error(&self) -> bool {
        self.error().is_some_and(|e| !e.is_domain_missing())
    }

    /// Whether the failure was the retrieval budget running out.
    pub fn timed_out(&self) -> bool {
        self.error().is_some_and(BifrostError::is_timeout)
    }

    pub fn response_class(&self) -> ResponseClass {
        match &self.result {
            Ok(_) => ResponseClass::Serve,
            Err(e) if e.is_domain_missing() || matches!(e, BifrostError::InvalidInput(_)) => {
                ResponseClass::NotFound
            }
            Err(_) => ResponseClass::BadGateway,
        }
    }

    /// Consume the lookup, returning the domain or the error.
    pub fn into_result(self) -> Result<Arc<VirtualDomain>, BifrostError> {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_class_distinguishes_absence_from_failure() {
        let ok = Lookup::resolved("a.example.com", 200, Arc::new(VirtualDomain::default()));
        assert_eq!(ok.response_class(), ResponseClass::Serve);
        assert!(!ok.has_temporary_error());

        let missing = Lookup::failed("a.example.com", BifrostError::DomainDoesNotExist);
        assert_eq!(missing.response_class(), ResponseClass::NotFound);
        assert!(missing.is_domain_missing());
        assert!(!missing.has_temporary_error());
        assert_eq!(missing.status, Some(204));

        let down = Lookup::failed("a.example.com", BifrostError::Http("reset".into()));
        assert_eq!(down.response_class(), ResponseClass::BadGateway);
        assert!(down.has_temporary_error());
        assert!(!down.timed_out());
        assert_eq!(down.status, None);
    }

    #[test]
    fn into_result_yields_domain_or_error() {
        let domain = Arc::new(VirtualDomain::default());
        let ok = Lookup::resolved("a.example.com", 200, Arc::clone(&domain));
        assert!(Arc::ptr_eq(&ok.into_result().unwrap(), &domain));

        let missing = Lookup::failed("a.example.com", BifrostError::DomainDoesNotExist);
        assert_eq!(missing.into_result().unwrap_err(), BifrostError::DomainDoesNotExist);
    }
}
