//! Streaming chunk decoder.
//!
//! Decoding a sub-range of a data variable's flattened elements is a
//! two-pass pipeline over two kinds of ranged reads:
//!
//! - an index read (`IndexRead`) fetching the fixed 16-byte
//!   `(byteOffset, byteLen)` entries for the chunks the range touches, in
//!   one contiguous fetch since entries are laid out in chunk order;
//! - a data read (`DataRead`) covering the union byte span of those
//!   entries' payloads in `data_region`, split into `slices` equal-width
//!   pieces so a caller wiring this to HTTP can pipeline the requests.
//!
//! The decoder never reads outside these two spans: a sparse read range
//! costs exactly one index fetch plus the union data fetch, not one fetch
//! per chunk.

use crate::codec::Codec;
use crate::error::OmError;
use crate::variable::DataVariable;
use crate::RangeSource;

const INDEX_ENTRY_SIZE: u64 = 16;

/// A planned ranged read against the index region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexRead {
    pub offset: u64,
    pub len: u64,
}

/// A planned ranged read against the data region. `slice_index` identifies
/// this piece's position within the equal-width split of the union span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRead {
    pub offset: u64,
    pub len: u64,
    pub slice_index: usize,
}

/// Progress through the `slices`-way data fetch, reported as reads
/// complete so a caller can surface download progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceProgress {
    pub fetched: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkDecoderConfig {
    /// Number of equal-width pieces the union data span is split into.
    pub slices: usize,
}

impl Default for ChunkDecoderConfig {
    fn default() -> Self {
        Self { slices: 4 }
    }
}

struct IndexEntry {
    offset: u64,
    len: u64,
}

pub struct ChunkDecoder<C: Codec> {
    codec: C,
    config: ChunkDecoderConfig,
}

impl<C: Codec> ChunkDecoder<C> {
    pub fn new(codec: C, config: ChunkDecoderConfig) -> Self {
        Self { codec, config }
    }

    /// Decode the full cube in canonical (row-major, flattened) order.
    pub async fn decode_all<S: RangeSource + ?Sized>(
        &self,
        source: &S,
        variable: &DataVariable,
    ) -> Result<Vec<f32>, OmError> {
        self.decode_range(source, variable, 0, variable.element_count()).await
    }

    /// Decode `[read_offset, read_offset + read_count)` of the flattened
    /// cube, fetching only the chunks that overlap the range.
    pub async fn decode_range<S: RangeSource + ?Sized>(
        &self,
        source: &S,
        variable: &DataVariable,
        read_offset: u64,
        read_count: u64,
    ) -> Result<Vec<f32>, OmError> {
        let element_count = variable.element_count();
        if read_count == 0 {
            return Ok(Vec::new());
        }
        if read_offset + read_count > element_count {
            return Err(OmError::TruncatedVariable { offset: variable.data_region.0 });
        }

        let chunk_size = variable.chunk_size;
        let first_chunk = read_offset / chunk_size;
        let last_chunk = (read_offset + read_count - 1) / chunk_size;

        let index_read = self.next_index_read(variable, first_chunk, last_chunk)?;
        let index_bytes = source.fetch_range(index_read.offset, index_read.len).await?;
        let entries = parse_index_entries(&index_bytes, variable)?;

        let union_start = entries.iter().map(|e| e.offset).min().unwrap();
        let union_end = entries.iter().map(|e| e.offset + e.len).max().unwrap();
        let union_len = union_end - union_start;

        let data_reads = self.next_data_reads(variable, union_start, union_len);
        let mut buffer = vec![0u8; union_len as usize];
        for read in &data_reads {
            let piece = source.fetch_range(read.offset, read.len).await?;
            let local_start = (read.offset - (variable.data_region.0 + union_start)) as usize;
            buffer[local_start..local_start + piece.len()].copy_from_slice(&piece);
        }

        let mut output = vec![0.0f32; read_count as usize];
        for (i, chunk_idx) in (first_chunk..=last_chunk).enumerate() {
            let entry = &entries[i];
            let local = (entry.offset - union_start) as usize;
            let compressed = &buffer[local..local + entry.len as usize];

            let this_chunk_start = chunk_idx * chunk_size;
            let this_chunk_len = chunk_size.min(element_count - this_chunk_start);
            let mut decoded = vec![0.0f32; this_chunk_len as usize];
            self.codec.decode_chunk(compressed, &mut decoded)?;

            let overlap_start = this_chunk_start.max(read_offset);
            let overlap_end = (this_chunk_start + this_chunk_len).min(read_offset + read_count);
            if overlap_start < overlap_end {
                let src_start = (overlap_start - this_chunk_start) as usize;
                let src_end = (overlap_end - this_chunk_start) as usize;
                let dst_start = (overlap_start - read_offset) as usize;
                output[dst_start..dst_start + (src_end - src_start)]
                    .copy_from_slice(&decoded[src_start..src_end]);
            }
        }

        Ok(output)
    }

    fn next_index_read(
        &self,
        variable: &DataVariable,
        first_chunk: u64,
        last_chunk: u64,
    ) -> Result<IndexRead, OmError> {
        let offset = variable.index_region.0 + first_chunk * INDEX_ENTRY_SIZE;
        let len = (last_chunk - first_chunk + 1) * INDEX_ENTRY_SIZE;
        if offset + len > variable.index_region.0 + variable.index_region.1 {
            return Err(OmError::TruncatedVariable { offset: variable.index_region.0 });
        }
        Ok(IndexRead { offset, len })
    }

    fn next_data_reads(
        &self,
        variable: &DataVariable,
        union_start: u64,
        union_len: u64,
    ) -> Vec<DataRead> {
        let base = variable.data_region.0 + union_start;
        let slices = self.config.slices.max(1) as u64;
        let piece_len = union_len.div_ceil(slices);
        let mut reads = Vec::new();
        let mut pos = 0u64;
        let mut slice_index = 0;
        while pos < union_len {
            let len = piece_len.min(union_len - pos);
            reads.push(DataRead { offset: base + pos, len, slice_index });
            pos += len;
            slice_index += 1;
        }
        reads
    }
}

fn parse_index_entries(bytes: &[u8], variable: &DataVariable) -> Result<Vec<IndexEntry>, OmError> {
    if bytes.len() as u64 % INDEX_ENTRY_SIZE != 0 {
        return Err(OmError::TruncatedVariable { offset: variable.index_region.0 });
    }
    Ok(bytes
        .chunks_exact(INDEX_ENTRY_SIZE as usize)
        .map(|c| IndexEntry {
            offset: u64::from_le_bytes(c[0..8].try_into().unwrap()),
            len: u64::from_le_bytes(c[8..16].try_into().unwrap()),
        })
        .collect())
}
