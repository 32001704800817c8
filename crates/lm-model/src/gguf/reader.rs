use std::io::{BufReader, Seek};
use std::path::Path;

use memmap2::Mmap;

use lm_tensor::{CpuStorage, Tensor};

use super::align;
use super::header::GgufHeader;
use super::metadata::GgufMetadata;
use super::tensor_info::{self, GgufTensorInfo};
use crate::error::{ModelError, Result};

/// An opened model file.
///
/// The header, metadata and tensor table are parsed eagerly; tensor data is
/// read lazily through a read-only memory map and copied out when a tensor
/// is loaded, so the map can be dropped once the model is built.
pub struct GgufFile {
    pub header: GgufHeader,
    pub metadata: GgufMetadata,
    pub tensor_infos: Vec<GgufTensorInfo>,
    mmap: Mmap,
    data_offset: usize,
}

impl GgufFile {
    /// Parse the header, metadata and tensor table of the file at `path`.
    pub fn open(path: &Path) -> Result<GgufFile> {
        let file = std::fs::File::open(path)?;
        let mut reader = BufReader::new(&file);

        let header = GgufHeader::parse(&mut reader)?;
        let metadata = GgufMetadata::parse_kv(&mut reader, header.n_kv)?;
        let tensor_infos = tensor_info::parse_tensor_infos(&mut reader, header.n_tensors)?;

        let data_offset = align(reader.stream_position()? as usize);

        // SAFETY: the map is read-only and model files are not expected to
        // be modified while loaded.
        let mmap = unsafe { Mmap::map(&file)? };

        Ok(GgufFile {
            header,
            metadata,
            tensor_infos,
            mmap,
            data_offset,
        })
    }

    /// Look up a tensor entry by name.
    pub fn tensor_info(&self, name: &str) -> Option<&GgufTensorInfo> {
        self.tensor_infos.iter().find(|t| t.name == name)
    }

    /// Raw bytes of a tensor within the memory-mapped file.
    ///
    /// Fails instead of panicking when the file is shorter than the tensor
    /// table claims.
    pub fn tensor_data(&self, info: &GgufTensorInfo) -> Result<&[u8]> {
        let start = self.data_offset.saturating_add(info.offset as usize);
        let end = start.saturating_add(info.data_size());
        self.mmap
            .get(start..end)
            .ok_or_else(|| ModelError::TruncatedTensor {
                name: info.name.clone(),
                start,
                end,
                len: self.mmap.len(),
            })
    }

    /// Load a tensor by name, widening F16 data to f32.
    pub fn get_tensor_f32(&self, name: &str) -> Result<Tensor> {
        let info = self
            .tensor_info(name)
            .ok_or_else(|| ModelError::TensorNotFound(name.to_string()))?;

        let raw = self.tensor_data(info)?;
        let storage = CpuStorage::decode_le(info.dtype, raw, info.numel())?;
        Ok(Tensor::from_storage(storage, info.shape())?)
    }

    /// Like `get_tensor_f32`, but `Ok(None)` when the tensor is absent.
    pub fn get_optional_tensor_f32(&self, name: &str) -> Result<Option<Tensor>> {
        match self.get_tensor_f32(name) {
            Ok(t) => Ok(Some(t)),
            Err(ModelError::TensorNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
