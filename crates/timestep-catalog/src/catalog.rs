//! The authoritative in-memory timestep index for one model: discovery,
//! reconciliation, and per-parameter availability behind one query surface.

use crate::availability::{quorum_init, ParamState};
use crate::discovery::{discover, ObjectStoreLister};
use crate::reconcile::reconcile;
use net_fetch::PersistentCache;
use reqwest::Client;
use std::collections::HashMap;
use tile_common::{EngineError, ParamId, Timestep};

/// One entry in the catalog's timestep sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestepEntry {
    pub timestep: Timestep,
    pub index: usize,
    pub run: String,
    pub url: String,
}

/// The reconciled timestep sequence for one model, plus per-parameter
/// availability state layered on top of it.
pub struct Catalog {
    entries: Vec<TimestepEntry>,
    params: HashMap<ParamId, ParamState>,
}

impl Catalog {
    /// Discover, reconcile, and quorum-seed availability for one model.
    ///
    /// `url_for` builds a parameter's `.om` URL from a run label and
    /// timestep; the catalog stores one url-bearing entry per timestep
    /// using the first parameter in `params` as the representative URL for
    /// cache-quorum matching (matching is done by basename, so any
    /// parameter's file naming is equivalent for this purpose as long as
    /// the run/timestep segments are shared across parameters).
    pub async fn bootstrap(
        client: &Client,
        lister: &dyn ObjectStoreLister,
        cache: &dyn PersistentCache,
        manifest_url: &str,
        bucket_url: &str,
        params: &[ParamId],
        url_for: impl Fn(&str, &Timestep) -> String,
        cache_quorum: usize,
    ) -> Result<Self, EngineError> {
        let raw = discover(client, lister, manifest_url, bucket_url).await?;
        let reconciled = reconcile(&raw);

        let entries: Vec<TimestepEntry> = reconciled
            .into_iter()
            .map(|r| TimestepEntry {
                url: url_for(&r.run, &r.timestep),
                timestep: r.timestep,
                index: r.index,
                run: r.run,
            })
            .collect();

        let mut param_states = HashMap::new();
        for param in params {
            let stats = cache.get_param_stats(&param.0).await;
            let urls: Vec<(&Timestep, &str)> =
                entries.iter().map(|e| (&e.timestep, e.url.as_str())).collect();
            param_states.insert(param.clone(), quorum_init(&stats, urls, cache_quorum));
        }

        Ok(Self { entries, params: param_states })
    }

    /// Build a catalog directly from already-reconciled entries, for tests
    /// and for callers that perform discovery themselves.
    pub fn from_entries(entries: Vec<TimestepEntry>) -> Self {
        Self { entries, params: HashMap::new() }
    }

    pub fn entries(&self) -> &[TimestepEntry] {
        &self.entries
    }

    pub fn find(&self, ts: &Timestep) -> Option<&TimestepEntry> {
        self.entries.iter().find(|e| &e.timestep == ts)
    }

    pub fn param_state(&self, param: &ParamId) -> Option<&ParamState> {
        self.params.get(param)
    }

    pub fn param_state_mut(&mut self, param: &ParamId) -> &mut ParamState {
        self.params.entry(param.clone()).or_default()
    }

    pub fn is_cached(&self, param: &ParamId, ts: &Timestep) -> bool {
        self.params.get(param).map(|s| s.is_cached(ts)).unwrap_or(false)
    }

    pub fn is_gpu_loaded(&self, param: &ParamId, ts: &Timestep) -> bool {
        self.params.get(param).map(|s| s.is_gpu_loaded(ts)).unwrap_or(false)
    }
}
