//! Discovers the available timesteps for a model, reconciles a published
//! manifest against object-store listings, and tracks per-parameter
//! availability (remote / persistent-cache / GPU-resident).

pub mod availability;
pub mod catalog;
pub mod discovery;
pub mod reconcile;
pub mod window;

pub use availability::{quorum_init, ParamState, DEFAULT_CACHE_QUORUM};
pub use catalog::{Catalog, TimestepEntry};
pub use discovery::{discover, HttpObjectStoreLister, ObjectStoreLister, RawDiscovery, RunEntry};
pub use reconcile::{reconcile, ReconciledEntry};
pub use window::{adjacent, get_window, get_window_tasks};
