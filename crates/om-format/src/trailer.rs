//! Fixed-size trailer at the end of an `.om` file.

use crate::error::OmError;

/// Trailer layout, little-endian, anchored at end-of-file:
/// `[rootOffset: u64][rootSize: u64][magic: 4 bytes "OM01"]`.
pub const TRAILER_SIZE: u64 = 20;
const MAGIC: &[u8; 4] = b"OM01";

/// The two 64-bit pointers the trailer resolves to: the byte span of the
/// root container variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub root_offset: u64,
    pub root_size: u64,
}

impl Trailer {
    /// Parse a trailer from its raw bytes (exactly [`TRAILER_SIZE`] long).
    pub fn parse(bytes: &[u8]) -> Result<Self, OmError> {
        if bytes.len() as u64 != TRAILER_SIZE {
            return Err(OmError::TruncatedTrailer {
                expected: TRAILER_SIZE as usize,
                got: bytes.len(),
            });
        }
        if &bytes[16..20] != MAGIC {
            return Err(OmError::BadMagic);
        }
        let root_offset = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let root_size = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        Ok(Trailer { root_offset, root_size })
    }

    /// Serialize a trailer. Used by the synthetic-fixture writer.
    pub fn to_bytes(self) -> [u8; TRAILER_SIZE as usize] {
        let mut out = [0u8; TRAILER_SIZE as usize];
        out[0..8].copy_from_slice(&self.root_offset.to_le_bytes());
        out[8..16].copy_from_slice(&self.root_size.to_le_bytes());
        out[16..20].copy_from_slice(MAGIC);
        out
    }
}
