//! In-memory caching primitives.
//!
//! [`TtlCache`] is the storage primitive; [`CacheRegistry`] owns one instance
//! per [`CacheClass`] and is passed by reference to whoever needs it.

mod registry;
mod ttl;
mod types;

pub use registry::{CacheInstance, CacheRegistry};
pub use ttl::TtlCache;
pub use types::*;
