//! Error types for `.om` parsing and decoding.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OmError {
    #[error("range source failed: {0}")]
    Source(String),

    #[error("truncated trailer: expected {expected} bytes, got {got}")]
    TruncatedTrailer { expected: usize, got: usize },

    #[error("bad trailer magic")]
    BadMagic,

    #[error("truncated variable header at offset {offset}")]
    TruncatedVariable { offset: u64 },

    #[error("variable '{name}' not found; available: {available:?}")]
    VariableNotFound { name: String, available: Vec<String> },

    #[error("variable at offset {offset} is not a data variable")]
    NotADataVariable { offset: u64 },

    #[error("decode error (code {code}) at offset {offset}")]
    Decode { code: i32, offset: u64 },
}
