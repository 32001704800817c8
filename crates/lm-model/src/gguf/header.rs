use std::io::{Read, Write};

use super::metadata::read_bytes;
use crate::error::{ModelError, Result};

/// File magic, ASCII "GGUF".
pub const GGUF_MAGIC: [u8; 4] = [0x47, 0x47, 0x55, 0x46];

/// The only GGUF version read or written.
pub const GGUF_VERSION: u32 = 3;

/// Alignment of the tensor data section and of every tensor in it.
pub const GGUF_DEFAULT_ALIGNMENT: usize = 32;

/// Fixed-size prefix of a model file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GgufHeader {
    pub version: u32,
    pub n_tensors: u64,
    pub n_kv: u64,
}

impl GgufHeader {
    /// Read and validate the fixed 24-byte prefix: magic, version (u32),
    /// tensor count and KV count (both u64), all little-endian.
    pub fn parse(reader: &mut impl Read) -> Result<GgufHeader> {
        let magic: [u8; 4] = read_bytes(reader)?;
        if magic != GGUF_MAGIC {
            return Err(ModelError::InvalidMagic(magic));
        }
        let version = u32::from_le_bytes(read_bytes(reader)?);
        if version != GGUF_VERSION {
            return Err(ModelError::UnsupportedVersion(version));
        }
        Ok(GgufHeader {
            version,
            n_tensors: u64::from_le_bytes(read_bytes(reader)?),
            n_kv: u64::from_le_bytes(read_bytes(reader)?),
        })
    }

    /// Write the header in the layout `parse` expects.
    pub fn write(&self, writer: &mut impl Write) -> Result<()> {
        writer.write_all(&GGUF_MAGIC)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.n_tensors.to_le_bytes())?;
        writer.write_all(&self.n_kv.to_le_bytes())?;
        Ok(())
    }
}
