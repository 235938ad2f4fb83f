//! Addon catalogs.
//!
//! A catalog request is answered from a cached, fully transformed collection.
//! On a miss the whole upstream collection is fetched, transformed and cached
//! under a key that ignores pagination and shuffling, then sliced.

mod service;
mod types;

pub use service::{film_state_key, CatalogService};
pub use types::*;
