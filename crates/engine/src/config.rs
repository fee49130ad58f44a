//! Declarative model/layer configuration and top-level engine tunables.
//!
//! `ModelConfig` is the `omParams: [string]` / `slabs: [SlabConfig]`
//! configuration surface, loaded from YAML the way the downloader
//! service's `config.rs` loads per-model YAML.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tile_common::{EngineError, LayerId, LayerSpec, ParamId, SlabConfig};

/// One visualization layer's parameter/slab wiring, as it appears in a
/// model's YAML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub id: String,
    /// `.om` variable names, one per slab, in slab order.
    pub om_params: Vec<String>,
    pub slabs: Vec<SlabSizeConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlabSizeConfig {
    pub name: String,
    pub size_bytes: usize,
}

impl LayerConfig {
    pub fn into_layer_spec(self) -> Result<LayerSpec, EngineError> {
        if self.om_params.len() != self.slabs.len() {
            return Err(EngineError::Config(format!(
                "layer '{}' has {} om_params but {} slabs",
                self.id,
                self.om_params.len(),
                self.slabs.len()
            )));
        }
        let om_params = self.om_params.into_iter().map(ParamId::new).collect();
        let slabs = self.slabs.into_iter().map(|s| SlabConfig::new(s.name, s.size_bytes)).collect();
        Ok(LayerSpec::new(LayerId::new(self.id), om_params, slabs))
    }
}

/// One model's discovery endpoints, parameter set, and layer definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub manifest_url: String,
    pub bucket_url: String,
    /// The `.om` URL path template; `{run}` and `{timestep}` are
    /// substituted per entry.
    pub url_template: String,
    pub layers: Vec<LayerConfig>,
}

impl ModelConfig {
    pub fn load(yaml: &str) -> Result<Self, EngineError> {
        serde_yaml::from_str(yaml).map_err(|e| EngineError::Config(format!("parsing model config: {e}")))
    }

    /// The distinct `.om` parameter names across every layer, for catalog
    /// quorum-seeding.
    pub fn params(&self) -> Vec<ParamId> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for layer in &self.layers {
            for name in &layer.om_params {
                if seen.insert(name.clone()) {
                    out.push(ParamId::new(name.clone()));
                }
            }
        }
        out
    }

    pub fn url_for(&self, run: &str, timestep: &tile_common::Timestep) -> String {
        self.url_template.replace("{run}", run).replace("{timestep}", timestep.as_str())
    }

    pub fn layer_specs(&self) -> Result<Vec<LayerSpec>, EngineError> {
        self.layers.iter().cloned().map(LayerConfig::into_layer_spec).collect()
    }
}

/// Top-level tunables for one `Engine` instance. Named constants rather
/// than magic numbers scattered through `decoder`/`engine` logic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Number of parallel decode workers. Clamped to `[1, 16]` by
    /// [`worker_pool::WorkerPool::new`].
    pub worker_pool_size: usize,
    /// Minimum matching persistent-cache range entries before a timestep
    /// is reported `cache = true` (spec open question (b)).
    pub cache_quorum: usize,
    /// Number of equal-width pieces the chunk decoder splits a data
    /// variable's union byte span into per task.
    pub slice_count: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { worker_pool_size: 4, cache_quorum: timestep_catalog::DEFAULT_CACHE_QUORUM, slice_count: 10 }
    }
}

impl EngineConfig {
    /// Mirrors [`scheduler::SAMPLE_WINDOW`]; surfaced here so a host reads
    /// every tunable off one struct instead of reaching into submodules.
    pub fn bandwidth_window(&self) -> Duration {
        scheduler::SAMPLE_WINDOW
    }

    /// Mirrors [`net_fetch::PERSISTENT_CACHE_TIMEOUT`].
    pub fn persistent_cache_timeout(&self) -> Duration {
        net_fetch::PERSISTENT_CACHE_TIMEOUT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_model_config() {
        let yaml = r#"
id: gfs
manifest_url: https://example.com/gfs/latest.json
bucket_url: https://example.com
url_template: "gfs/{run}/{timestep}.om"
layers:
  - id: temperature
    om_params: [t2m]
    slabs:
      - { name: t2m, size_bytes: 1048576 }
  - id: wind
    om_params: [u10, v10]
    slabs:
      - { name: u10, size_bytes: 1048576 }
      - { name: v10, size_bytes: 1048576 }
"#;
        let config = ModelConfig::load(yaml).unwrap();
        assert_eq!(config.id, "gfs");
        assert_eq!(config.layers.len(), 2);
        assert_eq!(config.params().len(), 3);
    }

    #[test]
    fn mismatched_slab_and_param_counts_are_rejected() {
        let layer = LayerConfig {
            id: "bad".into(),
            om_params: vec!["a".into(), "b".into()],
            slabs: vec![SlabSizeConfig { name: "a".into(), size_bytes: 1 }],
        };
        assert!(layer.into_layer_spec().is_err());
    }

    #[test]
    fn url_template_substitutes_run_and_timestep() {
        let config = ModelConfig {
            id: "gfs".into(),
            manifest_url: "https://example.com/latest.json".into(),
            bucket_url: "https://example.com".into(),
            url_template: "gfs/{run}/{timestep}.om".into(),
            layers: Vec::new(),
        };
        let ts = tile_common::Timestep::parse("2026-08-01T1200").unwrap();
        assert_eq!(config.url_for("1200Z", &ts), "gfs/1200Z/2026-08-01T1200.om");
    }

    #[test]
    fn default_config_has_sane_bounds() {
        let config = EngineConfig::default();
        assert!((1..=16).contains(&config.worker_pool_size));
        assert_eq!(config.cache_quorum, 10);
    }
}
