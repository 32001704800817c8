use std::io::{Read, Write};

use lm_tensor::{DType, Shape};

use super::metadata::{read_bytes, read_gguf_string, write_gguf_string};
use crate::error::{ModelError, Result};

/// One entry of the tensor table.
#[derive(Debug, Clone, PartialEq)]
pub struct GgufTensorInfo {
    /// Tensor name (e.g. "blk.0.weight_ih").
    pub name: String,
    /// Dimension sizes, outermost first.
    pub dims: Vec<u64>,
    /// Element type on disk.
    pub dtype: DType,
    /// Offset of the data, relative to the start of the data section.
    pub offset: u64,
}

impl GgufTensorInfo {
    /// Element count; saturates instead of overflowing on corrupt dims.
    pub fn numel(&self) -> usize {
        self.dims
            .iter()
            .fold(1usize, |acc, &d| acc.saturating_mul(d as usize))
    }

    /// Bytes occupied on disk.
    pub fn data_size(&self) -> usize {
        self.numel().saturating_mul(self.dtype.size_in_bytes())
    }

    pub fn shape(&self) -> Shape {
        Shape::new(self.dims.iter().map(|&d| d as usize).collect())
    }

    /// Write this entry in the layout `parse_tensor_infos` reads.
    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        write_gguf_string(writer, &self.name)?;
        writer.write_all(&(self.dims.len() as u32).to_le_bytes())?;
        for d in &self.dims {
            writer.write_all(&d.to_le_bytes())?;
        }
        writer.write_all(&self.dtype.to_gguf_type().to_le_bytes())?;
        writer.write_all(&self.offset.to_le_bytes())?;
        Ok(())
    }
}

/// Byte size of a tensor, or `None` when the element or byte count
/// does not fit in `usize`.
fn checked_byte_size(dims: &[u64], dtype: DType) -> Option<usize> {
    dims.iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(usize::try_from(d).ok()?))?
        .checked_mul(dtype.size_in_bytes())
}

/// Read the tensor table that follows the metadata.
///
/// Entry layout: name (GGUF string), dim count (u32), dims (u64 each,
/// outermost first), GGUF type id (u32), data offset (u64).
pub fn parse_tensor_infos(reader: &mut impl Read, n_tensors: u64) -> Result<Vec<GgufTensorInfo>> {
    let mut infos = Vec::new();
    for _ in 0..n_tensors {
        let name = read_gguf_string(reader)?;
        let n_dims = u32::from_le_bytes(read_bytes(reader)?);
        let dims = (0..n_dims)
            .map(|_| -> Result<u64> { Ok(u64::from_le_bytes(read_bytes(reader)?)) })
            .collect::<Result<Vec<u64>>>()?;
        let type_id = u32::from_le_bytes(read_bytes(reader)?);
        let dtype = DType::from_gguf_type(type_id)
            .ok_or(ModelError::UnsupportedGgufType(type_id))?;
        let offset = u64::from_le_bytes(read_bytes(reader)?);
        if checked_byte_size(&dims, dtype).is_none() {
            return Err(ModelError::InvalidConfig(format!(
                "tensor '{}' dims {:?} overflow the address space",
                name, dims
            )));
        }
        infos.push(GgufTensorInfo {
            name,
            dims,
            dtype,
            offset,
        });
    }
    Ok(infos)
}
