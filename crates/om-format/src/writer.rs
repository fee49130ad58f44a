//! Synthetic `.om` file builder, used by this crate's own tests and by
//! `test-utils` to produce fixtures without a real model-run export.

use crate::codec::{Codec, DeflateCodec};
use crate::trailer::Trailer;
use crate::variable::{ChildSpan, KIND_CONTAINER, KIND_DATA};
use bytes::Bytes;

struct PendingVariable {
    name: String,
    dims: Vec<u64>,
    chunk_size: u64,
    values: Vec<f32>,
}

#[derive(Default)]
pub struct OmFileBuilder {
    variables: Vec<PendingVariable>,
}

impl OmFileBuilder {
    pub fn new() -> Self {
        Self { variables: Vec::new() }
    }

    pub fn add_data_variable(&mut self, name: &str, dims: Vec<u64>, chunk_size: u64, values: &[f32]) {
        self.variables.push(PendingVariable {
            name: name.to_string(),
            dims,
            chunk_size,
            values: values.to_vec(),
        });
    }

    pub fn build(self) -> (Bytes, Trailer) {
        let codec = DeflateCodec;
        let mut out = Vec::new();
        let mut children = Vec::new();

        for var in &self.variables {
            let element_count: u64 = var.dims.iter().product();
            let mut index_bytes = Vec::new();
            let mut data_bytes = Vec::new();
            let mut chunk_start = 0u64;
            let mut data_pos = 0u64;
            while chunk_start < element_count {
                let len = var.chunk_size.min(element_count - chunk_start);
                let chunk_values = &var.values[chunk_start as usize..(chunk_start + len) as usize];
                let compressed = codec.encode_chunk(chunk_values);
                index_bytes.extend_from_slice(&data_pos.to_le_bytes());
                index_bytes.extend_from_slice(&(compressed.len() as u64).to_le_bytes());
                data_pos += compressed.len() as u64;
                data_bytes.extend_from_slice(&compressed);
                chunk_start += len;
            }

            let var_offset = out.len() as u64;
            let header_len = data_header_len(&var.name, var.dims.len());
            let index_offset = var_offset + header_len;
            let index_size = index_bytes.len() as u64;
            let data_offset = index_offset + index_size;
            let data_size = data_bytes.len() as u64;

            let header = encode_data_header(
                &var.name,
                &var.dims,
                var.chunk_size,
                (index_offset, index_size),
                (data_offset, data_size),
            );
            debug_assert_eq!(header.len() as u64, header_len);

            out.extend_from_slice(&header);
            out.extend_from_slice(&index_bytes);
            out.extend_from_slice(&data_bytes);

            children.push(ChildSpan {
                offset: var_offset,
                size: header_len + index_size + data_size,
            });
        }

        let root_offset = out.len() as u64;
        let root_header = encode_container_header("root", &children);
        let root_size = root_header.len() as u64;
        out.extend_from_slice(&root_header);

        let trailer = Trailer { root_offset, root_size };
        out.extend_from_slice(&trailer.to_bytes());

        (Bytes::from(out), trailer)
    }
}

fn data_header_len(name: &str, dims_count: usize) -> u64 {
    1 + 4 + name.len() as u64 + 4 + 8 * dims_count as u64 + 8 + 8 + 8 + 8 + 8
}

fn encode_data_header(
    name: &str,
    dims: &[u64],
    chunk_size: u64,
    index_region: (u64, u64),
    data_region: (u64, u64),
) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(KIND_DATA);
    buf.extend_from_slice(&(name.len() as u32).to_le_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(&(dims.len() as u32).to_le_bytes());
    for d in dims {
        buf.extend_from_slice(&d.to_le_bytes());
    }
    buf.extend_from_slice(&chunk_size.to_le_bytes());
    buf.extend_from_slice(&index_region.0.to_le_bytes());
    buf.extend_from_slice(&index_region.1.to_le_bytes());
    buf.extend_from_slice(&data_region.0.to_le_bytes());
    buf.extend_from_slice(&data_region.1.to_le_bytes());
    buf
}

fn encode_container_header(name: &str, children: &[ChildSpan]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(KIND_CONTAINER);
    buf.extend_from_slice(&(name.len() as u32).to_le_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(&(children.len() as u32).to_le_bytes());
    for c in children {
        buf.extend_from_slice(&c.offset.to_le_bytes());
        buf.extend_from_slice(&c.size.to_le_bytes());
    }
    buf
}
