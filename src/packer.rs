use rayon::prelude::*;

use crate::attribute::{AttributeColumn, ColumnData, ComponentKind};
use crate::error::{ConvertError, Result};
use crate::support::pad_to_multiple;

/// A byte range (buffer view) inside a [`PackedBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: usize,
    pub length: usize,
}

impl ByteRange {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// All attribute bytes of one container, plus the range each column occupies.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedBuffer {
    bytes: Vec<u8>,
    ranges: Vec<ByteRange>,
}

impl PackedBuffer {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Decodes range `index` as `kind`.
    pub fn unpack(&self, index: usize, kind: ComponentKind) -> Result<ColumnData> {
        let range = self
            .ranges
            .get(index)
            .ok_or_else(|| ConvertError::Layout(format!("no byte range {}", index)))?;
        unpack_range(&self.bytes, *range, kind)
    }
}

/// Reads `range` of `bytes` back into typed values.
pub fn unpack_range(bytes: &[u8], range: ByteRange, kind: ComponentKind) -> Result<ColumnData> {
    let slice = bytes.get(range.offset..range.end()).ok_or_else(|| {
        ConvertError::Layout(format!(
            "range {}..{} exceeds buffer of {} bytes",
            range.offset,
            range.end(),
            bytes.len()
        ))
    })?;
    if slice.len() % kind.element_size() != 0 {
        return Err(ConvertError::Layout(format!(
            "range of {} bytes is not a multiple of the {} byte element size",
            slice.len(),
            kind.element_size()
        )));
    }
    Ok(match kind {
        ComponentKind::F32(_) => ColumnData::F32(
            slice
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        ),
        ComponentKind::U8(_) => ColumnData::U8(slice.to_vec()),
    })
}

/// Concatenates the columns in the given order. With `alignment` 1 the ranges are
/// back to back; larger values zero-pad so every range starts on a multiple of it.
pub fn pack_attributes(columns: &[AttributeColumn], alignment: usize) -> Result<PackedBuffer> {
    if columns.is_empty() {
        return Err(ConvertError::EmptyInput("no attributes to pack".to_string()));
    }
    if let Some(column) = columns.iter().find(|c| c.data.is_empty()) {
        return Err(ConvertError::EmptyInput(format!(
            "attribute `{}` has no values",
            column.semantic.key()
        )));
    }

    let encoded: Vec<Vec<u8>> = columns.par_iter().map(|c| c.data.to_le_bytes()).collect();

    let total: usize = encoded
        .iter()
        .map(|b| b.len() + pad_to_multiple(b.len(), alignment))
        .sum();
    let mut bytes = Vec::with_capacity(total);
    let mut ranges = Vec::with_capacity(encoded.len());
    for chunk in encoded {
        bytes.resize(bytes.len() + pad_to_multiple(bytes.len(), alignment), 0);
        ranges.push(ByteRange {
            offset: bytes.len(),
            length: chunk.len(),
        });
        bytes.extend_from_slice(&chunk);
    }

    Ok(PackedBuffer { bytes, ranges })
}
