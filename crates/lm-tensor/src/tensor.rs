use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::CpuStorage;

/// Dense row-major f32 tensor.
///
/// Used both for model weights and for recurrent states. Tensors are values:
/// nothing in this crate mutates a tensor after construction, so a state can
/// be expanded with many labels without being copied up front.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    storage: CpuStorage,
    shape: Shape,
}

impl Tensor {
    /// Wrap `data` with `shape`.
    ///
    /// # Panics
    /// Panics if `data.len() != shape.numel()`.
    pub fn new(data: Vec<f32>, shape: Shape) -> Self {
        assert_eq!(
            data.len(),
            shape.numel(),
            "{} values cannot fill shape {}",
            data.len(),
            shape
        );
        Tensor {
            storage: CpuStorage::from_f32_vec(data),
            shape,
        }
    }

    /// Build a tensor from decoded file storage, checking the element count.
    pub fn from_storage(storage: CpuStorage, shape: Shape) -> Result<Self> {
        if storage.len() != shape.numel() {
            return Err(TensorError::ShapeMismatch {
                expected: shape.dims().to_vec(),
                got: vec![storage.len()],
            });
        }
        Ok(Tensor { storage, shape })
    }

    pub fn zeros(shape: Shape) -> Self {
        Tensor {
            storage: CpuStorage::from_f32_vec(vec![0.0; shape.numel()]),
            shape,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// In-memory element type. Always F32; F16 data is widened on load.
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    pub fn data_f32(&self) -> &[f32] {
        self.storage.as_f32_slice()
    }

    /// Row `i` of a 2-D tensor, e.g. one embedding vector.
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        if self.shape.ndim() != 2 || i >= self.shape.dim(0) {
            return None;
        }
        let width = self.shape.dim(1);
        Some(&self.data_f32()[i * width..(i + 1) * width])
    }

    /// Largest absolute element-wise difference to `other`, or `None` when
    /// the shapes differ.
    pub fn max_abs_diff(&self, other: &Tensor) -> Option<f32> {
        if self.shape != other.shape {
            return None;
        }
        Some(
            self.data_f32()
                .iter()
                .zip(other.data_f32())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0f32, f32::max),
        )
    }

    pub fn storage(&self) -> &CpuStorage {
        &self.storage
    }
}
