//! HTTP transport for the engine: ranged `.om` reads, object-store
//! listings, manifest fetches, and the host's persistent-cache endpoint.
//!
//! Structural parsing stays in `om-format`; this crate only knows how to
//! turn engine requests into HTTP calls and HTTP responses into bytes behind
//! a narrow, instrumented API.

pub mod listing;
pub mod manifest;
pub mod persistent_cache;
pub mod range;

pub use listing::{list_prefix, ListResult};
pub use manifest::{fetch_manifest, Manifest};
pub use persistent_cache::{
    CacheStatItem, NullCache, PersistentCache, TimeoutCache, PERSISTENT_CACHE_TIMEOUT,
};
pub use range::{HttpRangeSource, ProgressSink};
