//! Per-parameter availability tracking: whether a timestep's slab data is
//! sitting in the host's persistent HTTP cache, and whether it has already
//! been decoded into a GPU-resident slot.

use net_fetch::CacheStatItem;
use std::collections::{HashMap, HashSet};
use tile_common::Timestep;

/// A timestep is only reported `cache = true` once at least this many
/// range entries for the parameter are present in the persistent cache.
/// Below that, a partial cache hit would still require enough remote
/// fetches that treating it as "fast" would mislead the scheduler's
/// admission control.
pub const DEFAULT_CACHE_QUORUM: usize = 10;

/// Per-timestep availability for one parameter: remote-only, cached, or
/// already resident on the GPU, plus the learned byte size of its last
/// completed download.
#[derive(Debug, Clone, Default)]
pub struct ParamState {
    cached: HashSet<String>,
    gpu_loaded: HashSet<String>,
    sizes: HashMap<String, u64>,
}

impl ParamState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cached(&self, ts: &Timestep) -> bool {
        self.cached.contains(ts.as_str())
    }

    pub fn is_gpu_loaded(&self, ts: &Timestep) -> bool {
        self.gpu_loaded.contains(ts.as_str())
    }

    /// The size in bytes of the last completed download for `ts`, if any.
    /// Kept across eviction (only `gpu_loaded` is cleared on eviction) so a
    /// timestep that re-enters the window after being evicted gets an
    /// estimate from its own prior fetch instead of the layer's static
    /// default.
    pub fn size_for(&self, ts: &Timestep) -> Option<u64> {
        self.sizes.get(ts.as_str()).copied()
    }

    /// Mark `ts` cached with its known size in bytes, or uncached if
    /// `bytes == 0`.
    pub fn set_cached(&mut self, ts: &Timestep, bytes: u64) {
        if bytes > 0 {
            self.cached.insert(ts.as_str().to_string());
            self.sizes.insert(ts.as_str().to_string(), bytes);
        } else {
            self.cached.remove(ts.as_str());
            self.sizes.remove(ts.as_str());
        }
    }

    pub fn set_gpu_loaded(&mut self, ts: &Timestep, loaded: bool) {
        if loaded {
            self.gpu_loaded.insert(ts.as_str().to_string());
        } else {
            self.gpu_loaded.remove(ts.as_str());
        }
    }

    /// Drop all GPU residency (e.g. after a pool resize clears every slot).
    /// The cache bit is untouched; it reflects the remote cache, not the
    /// GPU.
    pub fn clear_gpu(&mut self) {
        self.gpu_loaded.clear();
    }
}

fn basename(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Build a [`ParamState`] from a persistent-cache stat dump, matching
/// entries to catalog URLs by basename and requiring at least `quorum`
/// matches per timestep before marking it cached.
pub fn quorum_init<'a>(
    stats: &[CacheStatItem],
    urls: impl IntoIterator<Item = (&'a Timestep, &'a str)>,
    quorum: usize,
) -> ParamState {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut size_mb: HashMap<String, f64> = HashMap::new();
    for item in stats {
        let key = basename(&item.url).to_string();
        *counts.entry(key.clone()).or_insert(0) += 1;
        *size_mb.entry(key).or_insert(0.0) += item.size_mb;
    }

    let mut state = ParamState::new();
    for (ts, url) in urls {
        let key = basename(url);
        let count = counts.get(key).copied().unwrap_or(0);
        if count >= quorum {
            let bytes = (size_mb.get(key).copied().unwrap_or(0.0) * 1_000_000.0).max(1.0) as u64;
            state.set_cached(ts, bytes);
        }
    }
    state
}
