use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// CPU-side tensor storage.
///
/// All data lives in memory as f32; F16 data is widened when decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuStorage {
    /// 32-bit floating point storage.
    F32(Vec<f32>),
}

impl CpuStorage {
    /// Number of elements in this storage.
    pub fn len(&self) -> usize {
        match self {
            CpuStorage::F32(v) => v.len(),
        }
    }

    /// Returns true if the storage contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the data as an f32 slice.
    pub fn as_f32_slice(&self) -> &[f32] {
        match self {
            CpuStorage::F32(v) => v.as_slice(),
        }
    }

    /// Create storage from an f32 vector.
    pub fn from_f32_vec(data: Vec<f32>) -> Self {
        CpuStorage::F32(data)
    }

    /// Decode `numel` little-endian values of `dtype` from raw bytes.
    ///
    /// # Errors
    /// Returns an error if `bytes` is not exactly `numel` elements long.
    pub fn decode_le(dtype: DType, bytes: &[u8], numel: usize) -> Result<Self> {
        let expected = numel * dtype.size_in_bytes();
        if bytes.len() != expected {
            return Err(TensorError::Other(format!(
                "{} data is {} bytes but {} elements need {}",
                dtype,
                bytes.len(),
                numel,
                expected
            )));
        }

        let data = match dtype {
            DType::F32 => bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            DType::F16 => bytes
                .chunks_exact(2)
                .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect(),
        };
        Ok(CpuStorage::F32(data))
    }

    /// Encode the data as little-endian values of `dtype`.
    ///
    /// F16 encoding rounds to the nearest representable half value.
    pub fn encode_le(&self, dtype: DType) -> Vec<u8> {
        let data = self.as_f32_slice();
        let mut out = Vec::with_capacity(data.len() * dtype.size_in_bytes());
        match dtype {
            DType::F32 => {
                for v in data {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            DType::F16 => {
                for v in data {
                    out.extend_from_slice(&half::f16::from_f32(*v).to_le_bytes());
                }
            }
        }
        out
    }

    /// Returns the dtype of this storage.
    pub fn dtype(&self) -> DType {
        match self {
            CpuStorage::F32(_) => DType::F32,
        }
    }
}
