//! Per-chunk payload codec.
//!
//! Kept behind a trait so the wire codec is swappable without touching the
//! iterator logic in `decoder`, the way `grib2-parser::unpacking` separates
//! template dispatch from section parsing.

use crate::error::OmError;
use std::io::Read;

pub trait Codec: Send + Sync {
    /// Decode one chunk's compressed payload into `out`, which is sized to
    /// exactly the chunk's element count.
    fn decode_chunk(&self, compressed: &[u8], out: &mut [f32]) -> Result<(), OmError>;

    /// Encode a chunk's elements, used only by the synthetic fixture writer.
    fn encode_chunk(&self, values: &[f32]) -> Vec<u8>;
}

/// Deflate-compressed little-endian f32 chunks.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeflateCodec;

impl Codec for DeflateCodec {
    fn decode_chunk(&self, compressed: &[u8], out: &mut [f32]) -> Result<(), OmError> {
        let mut decoder = flate2::read::DeflateDecoder::new(compressed);
        let mut raw = Vec::with_capacity(out.len() * 4);
        decoder
            .read_to_end(&mut raw)
            .map_err(|e| OmError::Decode { code: e.raw_os_error().unwrap_or(-1), offset: 0 })?;
        if raw.len() != out.len() * 4 {
            return Err(OmError::Decode { code: -2, offset: 0 });
        }
        for (i, chunk) in raw.chunks_exact(4).enumerate() {
            out[i] = f32::from_le_bytes(chunk.try_into().unwrap());
        }
        Ok(())
    }

    fn encode_chunk(&self, values: &[f32]) -> Vec<u8> {
        use flate2::write::DeflateEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut raw = Vec::with_capacity(values.len() * 4);
        for v in values {
            raw.extend_from_slice(&v.to_le_bytes());
        }
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).expect("in-memory deflate write cannot fail");
        encoder.finish().expect("in-memory deflate finish cannot fail")
    }
}
