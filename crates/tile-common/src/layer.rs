//! Layer, parameter, and slab identity/configuration types.

use serde::{Deserialize, Serialize};

/// Identifier for a visualization layer (e.g. "wind_10m", "temperature_2m").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a parameter: an opaque name used both in `.om` variable
/// lookups and as the key of cache-state maps. A layer with multiple slabs
/// (e.g. a wind layer's `u`/`v` components) has one `ParamId` per slab.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParamId(pub String);

impl ParamId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ParamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed-size GPU buffer description for one slab of a layer's tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlabConfig {
    pub name: String,
    pub size_bytes: usize,
}

impl SlabConfig {
    pub fn new(name: impl Into<String>, size_bytes: usize) -> Self {
        Self {
            name: name.into(),
            size_bytes,
        }
    }
}

/// A visualization layer's parameter and slab configuration: `om_params[i]`
/// is the `.om` variable name decoded into `slabs[i]`'s buffer. A wind
/// layer has two entries (`u`, `v`); a scalar layer has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub id: LayerId,
    pub om_params: Vec<ParamId>,
    pub slabs: Vec<SlabConfig>,
}

impl LayerSpec {
    pub fn new(id: LayerId, om_params: Vec<ParamId>, slabs: Vec<SlabConfig>) -> Self {
        assert_eq!(om_params.len(), slabs.len(), "one om_param per slab");
        Self { id, om_params, slabs }
    }

    pub fn slab_count(&self) -> usize {
        self.slabs.len()
    }
}
