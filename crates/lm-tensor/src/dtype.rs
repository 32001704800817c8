use std::fmt;

/// Supported data types for serialized tensor data.
///
/// Everything is widened to f32 in memory; the dtype records how the values
/// were stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating point.
    F32,
    /// 16-bit floating point (IEEE 754 half-precision, via the `half` crate).
    F16,
}

impl DType {
    /// Returns the size in bytes of a single element.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
        }
    }

    /// Converts a GGUF type ID to a `DType`.
    ///
    /// Only the unquantized float types are understood: 0 => F32, 1 => F16.
    pub fn from_gguf_type(id: u32) -> Option<DType> {
        match id {
            0 => Some(DType::F32),
            1 => Some(DType::F16),
            _ => None,
        }
    }

    /// Returns the GGUF type ID for this `DType`.
    pub fn to_gguf_type(&self) -> u32 {
        match self {
            DType::F32 => 0,
            DType::F16 => 1,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F16 => write!(f, "f16"),
        }
    }
}
