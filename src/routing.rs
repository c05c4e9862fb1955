//! Request path → project matching.
//!
//! A [`VirtualDomain`] lists its projects longest prefix first, so the first
//! prefix that covers the request path is the most specific one. Prefixes
//! match on whole path segments: `/ab` covers `/ab` and `/ab/x` but not
//! `/abc`.

use crate::types::{LookupPath, VirtualDomain};

/// A request matched to the project serving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingRequest {
    pub lookup_path: LookupPath,
    /// Request path below the project prefix, without a leading `/`.
    pub sub_path: String,
    /// The domain's root project serving alongside other projects, i.e. a
    /// group-level site under which project sites are nested.
    pub is_namespace_project: bool,
}

/// Lowercase a Host header value and strip any port and trailing dot.
///
/// ```rust
/// # use bifrost::routing::normalize_host;
/// assert_eq!(normalize_host("Group.Pages.Example.com:8080"), "group.pages.example.com");
/// assert_eq!(normalize_host("[::1]:443"), "[::1]");
/// ```
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let host = if host.starts_with('[') {
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        match host.rsplit_once(':') {
            Some((name, port)) if !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => {
                name
            }
            _ => host,
        }
    };
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Resolve `.` and `..` segments and collapse repeated slashes.
///
/// The result always starts with `/`. A trailing slash is kept. Query and
/// fragment are dropped. `..` never climbs above the root.
///
/// ```rust
/// # use bifrost::routing::clean_path;
/// assert_eq!(clean_path("/a/../b//c/"), "/b/c/");
/// assert_eq!(clean_path("../../etc"), "/etc");
/// ```
pub fn clean_path(raw: &str) -> String {
    let path = match raw.find(['?', '#']) {
        Some(end) => &raw[..end],
        None => raw,
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut cleaned = String::with_capacity(path.len() + 1);
    cleaned.push('/');
    cleaned.push_str(&segments.join("/"));
    if path.ends_with('/') && !segments.is_empty() {
        cleaned.push('/');
    }
    cleaned
}

/// Whether `prefix` covers `path` on a segment boundary.
fn covers(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return path.starts_with('/');
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// The project serving `path`: the longest prefix covering it.
///
/// `path` should already be cleaned, and `domain`'s lookup paths sorted
/// (domains produced by the cache always are). Among equal-length prefixes
/// the first listed wins.
pub fn match_path<'a>(domain: &'a VirtualDomain, path: &str) -> Option<&'a LookupPath> {
    domain
        .lookup_paths
        .iter()
        .find(|lookup_path| covers(&lookup_path.prefix, path))
}

/// Clean a raw request path and match it against `domain`.
pub fn resolve_request(domain: &VirtualDomain, raw_path: &str) -> Option<ServingRequest> {
    let path = clean_path(raw_path);
    let lookup_path = match_path(domain, &path)?;

    let sub_path = path
        .strip_prefix(lookup_path.prefix.trim_end_matches('/'))
        .unwrap_or_default()
        .trim_start_matches('/')
        .to_string();

    Some(ServingRequest {
        lookup_path: lookup_path.clone(),
        sub_path,
        is_namespace_project: lookup_path.prefix == "/" && domain.lookup_paths.len() > 1,
    })
}
