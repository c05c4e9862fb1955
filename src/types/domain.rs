//! Virtual domain and lookup path types.
//!
//! A [`VirtualDomain`] is what the control plane answers for one hostname:
//! optional TLS material plus the list of projects served under it, each
//! scoped to a URL prefix ([`LookupPath`]).

use serde::{Deserialize, Serialize};

/// Serving configuration resolved for one hostname.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDomain {
    /// PEM certificate for custom domains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    /// PEM private key for custom domains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Projects served under this domain.
    ///
    /// Must be sorted by prefix length, longest first, before matching.
    /// See [`sort_lookup_paths()`](Self::sort_lookup_paths).
    #[serde(default)]
    pub lookup_paths: Vec<LookupPath>,
}

impl VirtualDomain {
    /// Create a domain with the given lookup paths, sorted for matching.
    pub fn new(lookup_paths: Vec<LookupPath>) -> Self {
        let mut domain = Self {
            certificate: None,
            key: None,
            lookup_paths,
        };
        domain.sort_lookup_paths();
        domain
    }

    /// Attach TLS material.
    pub fn with_certificate(mut self, certificate: impl Into<String>, key: impl Into<String>) -> Self {
        self.certificate = Some(certificate.into());
        self.key = Some(key.into());
        self
    }

    /// Sort lookup paths by prefix length, longest first.
    ///
    /// The sort is stable: equal-length prefixes keep their listed order.
    /// The group root (`/`) always ends up last.
    pub fn sort_lookup_paths(&mut self) {
        self.lookup_paths.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
    }

    /// Whether both certificate and key are present.
    pub fn has_certificate(&self) -> bool {
        matches!((&self.certificate, &self.key), (Some(c), Some(k)) if !c.is_empty() && !k.is_empty())
    }
}

/// One project's prefix-scoped serving configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupPath {
    pub project_id: u64,
    /// URL prefix, always starting with `/`.
    pub prefix: String,
    #[serde(default)]
    pub access_control: bool,
    #[serde(default)]
    pub https_only: bool,
    /// Canonical hostname requests should be redirected to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_host: Option<String>,
    pub source: Source,
}

impl LookupPath {
    /// Create a lookup path for a project served from `source`.
    pub fn new(project_id: u64, prefix: impl Into<String>, source: Source) -> Self {
        Self {
            project_id,
            prefix: prefix.into(),
            access_control: false,
            https_only: false,
            unique_host: None,
            source,
        }
    }

    pub fn with_access_control(mut self, enabled: bool) -> Self {
        self.access_control = enabled;
        self
    }

    pub fn with_https_only(mut self, enabled: bool) -> Self {
        self.https_only = enabled;
        self
    }

    pub fn with_unique_host(mut self, host: impl Into<String>) -> Self {
        self.unique_host = Some(host.into());
        self
    }
}

/// Where a project's content is served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    /// Backend location: a directory, an archive URL, or a function endpoint.
    #[serde(default)]
    pub path: String,
    /// Content hash of the deployed artifact, when the backend provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl Source {
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::File,
            path: path.into(),
            sha256: None,
        }
    }

    pub fn archive(path: impl Into<String>, sha256: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Archive,
            path: path.into(),
            sha256: Some(sha256.into()),
        }
    }

    pub fn function(endpoint: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Function,
            path: endpoint.into(),
            sha256: None,
        }
    }
}

/// Serving backend kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Local filesystem directory.
    File,
    /// Zip archive, possibly remote.
    #[serde(alias = "zip")]
    Archive,
    /// Reverse proxy to a function endpoint.
    #[serde(alias = "serverless")]
    Function,
}
