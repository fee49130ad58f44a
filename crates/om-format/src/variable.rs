//! Variable tree parsing and the name-resolution walk.

use crate::error::OmError;
use crate::trailer::Trailer;
use crate::RangeSource;

/// A child pointer stored inline in a container variable's own bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildSpan {
    pub offset: u64,
    pub size: u64,
}

pub(crate) const KIND_CONTAINER: u8 = 0;
pub(crate) const KIND_DATA: u8 = 1;

/// A parsed variable: either a container enumerating children, or a leaf
/// data variable describing a decodable cube.
#[derive(Debug, Clone)]
pub enum Variable {
    Container { name: String, children: Vec<ChildSpan> },
    Data(DataVariable),
}

/// A leaf data variable: its dimensions and the on-disk location of its
/// chunk index and chunk payload regions.
#[derive(Debug, Clone, PartialEq)]
pub struct DataVariable {
    pub name: String,
    pub dims: Vec<u64>,
    pub chunk_size: u64,
    /// (offset, size) of the packed `(byteOffset: u64, byteLen: u64)` index
    /// entry array, one entry per chunk, relative to file origin.
    pub index_region: (u64, u64),
    /// (offset, size) of the concatenated compressed chunk payloads,
    /// relative to file origin.
    pub data_region: (u64, u64),
}

impl DataVariable {
    pub fn element_count(&self) -> u64 {
        self.dims.iter().product()
    }

    pub fn chunk_count(&self) -> u64 {
        self.element_count().div_ceil(self.chunk_size)
    }
}

impl Variable {
    pub fn name(&self) -> &str {
        match self {
            Variable::Container { name, .. } => name,
            Variable::Data(d) => &d.name,
        }
    }

    pub fn children_count(&self) -> usize {
        match self {
            Variable::Container { children, .. } => children.len(),
            Variable::Data(_) => 0,
        }
    }

    pub fn child_at(&self, i: usize) -> Option<ChildSpan> {
        match self {
            Variable::Container { children, .. } => children.get(i).copied(),
            Variable::Data(_) => None,
        }
    }

    pub fn dimensions_count(&self) -> usize {
        match self {
            Variable::Data(d) => d.dims.len(),
            Variable::Container { .. } => 0,
        }
    }

    pub fn dimensions(&self) -> &[u64] {
        match self {
            Variable::Data(d) => &d.dims,
            Variable::Container { .. } => &[],
        }
    }

    /// Parse a variable header from its exact byte span (as located by a
    /// parent container's `ChildSpan`, or the trailer's root span).
    pub fn parse(bytes: &[u8], self_offset: u64) -> Result<Self, OmError> {
        let mut cur = Cursor::new(bytes, self_offset);
        let kind = cur.u8()?;
        let name_len = cur.u32()? as usize;
        let name = cur.utf8(name_len)?;

        match kind {
            KIND_CONTAINER => {
                let children_count = cur.u32()? as usize;
                let mut children = Vec::with_capacity(children_count);
                for _ in 0..children_count {
                    let offset = cur.u64()?;
                    let size = cur.u64()?;
                    children.push(ChildSpan { offset, size });
                }
                Ok(Variable::Container { name, children })
            }
            KIND_DATA => {
                let dims_count = cur.u32()? as usize;
                let mut dims = Vec::with_capacity(dims_count);
                for _ in 0..dims_count {
                    dims.push(cur.u64()?);
                }
                let chunk_size = cur.u64()?;
                let index_offset = cur.u64()?;
                let index_size = cur.u64()?;
                let data_offset = cur.u64()?;
                let data_size = cur.u64()?;
                Ok(Variable::Data(DataVariable {
                    name,
                    dims,
                    chunk_size,
                    index_region: (index_offset, index_size),
                    data_region: (data_offset, data_size),
                }))
            }
            _ => Err(OmError::TruncatedVariable { offset: self_offset }),
        }
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
    self_offset: u64,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8], self_offset: u64) -> Self {
        Self { bytes, pos: 0, self_offset }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], OmError> {
        if self.pos + n > self.bytes.len() {
            return Err(OmError::TruncatedVariable { offset: self.self_offset });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, OmError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, OmError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, OmError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn utf8(&mut self, len: usize) -> Result<String, OmError> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| OmError::TruncatedVariable {
            offset: self.self_offset,
        })
    }
}

/// Walk the variable tree starting at the trailer's root, locating a data
/// variable by name. Each container level costs exactly one ranged fetch
/// (the child's span is known from its parent, so no probing is needed).
pub async fn resolve_variable<S: RangeSource + ?Sized>(
    source: &S,
    trailer: Trailer,
    name: &str,
) -> Result<DataVariable, OmError> {
    let root_bytes = source.fetch_range(trailer.root_offset, trailer.root_size).await?;
    let root = Variable::parse(&root_bytes, trailer.root_offset)?;

    let mut available = Vec::new();
    let mut stack = vec![root];

    while let Some(var) = stack.pop() {
        if var.name() == name {
            match var {
                Variable::Data(d) => return Ok(d),
                Variable::Container { .. } => continue,
            }
        }
        available.push(var.name().to_string());
        if let Variable::Container { children, .. } = &var {
            for child in children {
                let bytes = source.fetch_range(child.offset, child.size).await?;
                stack.push(Variable::parse(&bytes, child.offset)?);
            }
        }
    }

    Err(OmError::VariableNotFound { name: name.to_string(), available })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::OmFileBuilder;
    use crate::MemorySource;

    #[tokio::test]
    async fn resolves_nested_variable() {
        let mut builder = OmFileBuilder::new();
        builder.add_data_variable("u10", vec![4, 4], 8, &vec![1.0f32; 16]);
        builder.add_data_variable("v10", vec![4, 4], 8, &vec![2.0f32; 16]);
        let (bytes, trailer) = builder.build();
        let source = MemorySource(bytes);

        let v = resolve_variable(&source, trailer, "v10").await.unwrap();
        assert_eq!(v.name, "v10");
        assert_eq!(v.dims, vec![4, 4]);
    }

    #[tokio::test]
    async fn reports_available_names_on_miss() {
        let mut builder = OmFileBuilder::new();
        builder.add_data_variable("u10", vec![4], 8, &vec![1.0f32; 4]);
        let (bytes, trailer) = builder.build();
        let source = MemorySource(bytes);

        let err = resolve_variable(&source, trailer, "missing").await.unwrap_err();
        match err {
            OmError::VariableNotFound { name, available } => {
                assert_eq!(name, "missing");
                assert!(available.contains(&"u10".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
