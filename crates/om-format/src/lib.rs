//! Reader for the `.om` chunked columnar tile format.
//!
//! The file ends with a fixed-size trailer pointing at a root container
//! variable; containers enumerate children by (offset, size) spans, and a
//! data variable's payload is a sequence of independently compressed
//! chunks, indexed by a flat array of (byte offset, byte length) entries.
//! Structural parsing walks explicit byte offsets over a `Bytes` buffer,
//! the way `grib2-parser`'s section readers do, rather than through a
//! derive-based binary format.

pub mod codec;
pub mod decoder;
pub mod error;
pub mod trailer;
pub mod variable;
pub mod writer;

pub use codec::{Codec, DeflateCodec};
pub use decoder::{ChunkDecoder, ChunkDecoderConfig, DataRead, IndexRead, SliceProgress};
pub use error::OmError;
pub use trailer::{Trailer, TRAILER_SIZE};
pub use variable::{ChildSpan, DataVariable, Variable};

use bytes::Bytes;

/// Source of ranged byte reads the decoder drives. Implemented by the
/// HTTP range fetcher in `net-fetch`, or by an in-memory byte buffer in
/// tests.
#[async_trait::async_trait]
pub trait RangeSource: Send + Sync {
    async fn fetch_range(&self, offset: u64, len: u64) -> Result<Bytes, OmError>;
}

/// A `RangeSource` over an in-memory buffer, used for unit/integration
/// tests and wherever a whole `.om` file has already been fetched.
pub struct MemorySource(pub Bytes);

#[async_trait::async_trait]
impl RangeSource for MemorySource {
    async fn fetch_range(&self, offset: u64, len: u64) -> Result<Bytes, OmError> {
        let start = offset as usize;
        let end = start + len as usize;
        if end > self.0.len() {
            return Err(OmError::Source(format!(
                "range {}..{} out of bounds (len {})",
                start,
                end,
                self.0.len()
            )));
        }
        Ok(self.0.slice(start..end))
    }
}
