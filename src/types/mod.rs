//! Public types for the Bifrost API.

mod domain;
mod lookup;

pub use domain::{LookupPath, Source, SourceKind, VirtualDomain};
pub use lookup::{Lookup, ResponseClass};
