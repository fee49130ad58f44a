//! Embeddable weather-tile streaming and GPU slot-caching engine.
//!
//! A host (typically a WASM binding driving a WebGL/WebGPU globe) loads a
//! [`ModelConfig`], bootstraps an [`Engine`], and drives it every frame
//! with [`Engine::tick`]: the engine discovers available timesteps,
//! reconciles its per-layer slot pools against the render cursor, and
//! streams `.om` data from object storage into decoded slab buffers the
//! host can upload to the GPU.

pub mod config;
pub mod decoder;
pub mod engine;

pub use config::{EngineConfig, LayerConfig, ModelConfig, SlabSizeConfig};
pub use decoder::OmHttpDecoder;
pub use engine::{default_cache, init_tracing, Engine};

pub use scheduler::SortStrategy;
pub use tile_common::{EngineError, LayerId, ParamId, Task, TaskId, Timestep};
