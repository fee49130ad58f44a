//! Umbrella error type for the weather-tile streaming engine.

use thiserror::Error;

/// Result type alias using [`EngineError`].
pub type EngineResult<T> = Result<T, EngineError>;

/// Top-level error type. Component crates surface failures through this
/// enum directly rather than defining their own, so the `engine` crate can
/// compose them without a translation layer at each boundary.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("network error fetching {url}: {detail}")]
    Network { url: String, status: Option<u16>, detail: String },

    #[error("variable '{name}' not found; available: {available:?}")]
    VariableNotFound { name: String, available: Vec<String> },

    #[error("decode error (code {code}) at offset {offset}")]
    Decode { code: i32, offset: u64 },

    #[error("worker crashed")]
    WorkerCrashed,

    #[error("out of memory resizing slot pool to {requested} slots")]
    OutOfMemory { requested: usize },

    #[error("operation aborted")]
    Aborted,

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether this error is recoverable by local retry/respawn rather than
    /// surfacing to the render layer as a missing tile.
    pub fn is_locally_recoverable(&self) -> bool {
        matches!(self, EngineError::Network { .. } | EngineError::WorkerCrashed)
    }
}
