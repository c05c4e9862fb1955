//! Bifrost - cached hostname resolution for static pages serving
//!
//! A pages server answers requests for many hostnames. What each hostname
//! serves (which projects, under which URL prefixes, from which backend) is
//! owned by a control plane that is slow and occasionally unavailable. This
//! crate keeps that answer close:
//!
//! - [`Cache`] holds one entry per hostname, served fresh, served stale while
//!   refreshed in the background, or re-resolved once expired.
//! - [`Retriever`] bounds each resolution with a deadline and fixed-interval
//!   retries.
//! - [`Resolver`] is the control-plane seam; [`ApiResolver`] implements it
//!   over the control plane's HTTP API.
//! - [`routing`] matches request paths to the project serving them.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bifrost::{ApiConfig, ApiResolver, Cache, CacheConfig, ResponseClass};
//! use bifrost::routing::resolve_request;
//!
//! #[tokio::main]
//! async fn main() -> bifrost::Result<()> {
//!     let resolver = ApiResolver::new(ApiConfig::new(
//!         "https://control.example.internal",
//!         "shared-secret",
//!     ))?;
//!     let cache = Cache::new(Arc::new(resolver), CacheConfig::default());
//!
//!     let lookup = cache.resolve("group.pages.example.com").await;
//!     match (lookup.response_class(), lookup.domain()) {
//!         (ResponseClass::Serve, Some(domain)) => {
//!             if let Some(request) = resolve_request(domain, "/project/index.html") {
//!                 println!("project {} serves {}", request.lookup_path.project_id, request.sub_path);
//!             }
//!         }
//!         (ResponseClass::NotFound, _) => println!("404"),
//!         _ => println!("502"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
#[cfg(feature = "server")]
pub mod config;
pub mod error;
pub mod resolver;
pub mod routing;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use cache::{Cache, CacheConfig};
pub use error::{BifrostError, Result};
pub use resolver::{ApiConfig, ApiResolver, Resolved, Resolver, Retriever, RetrieverConfig};
pub use routing::{ServingRequest, match_path};
pub use types::{Lookup, LookupPath, ResponseClass, Source, SourceKind, VirtualDomain};
pub use version::{PKG_VERSION, version_string};
