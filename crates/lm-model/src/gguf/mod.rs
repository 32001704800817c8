//! GGUF container used for recurrent LM model files.
//!
//! Only the pieces a recurrent LM needs are supported: scalar/string/array
//! metadata and unquantized F32/F16 tensors.

pub mod header;
pub mod metadata;
pub mod reader;
pub mod tensor_info;
pub mod writer;

pub use header::{GgufHeader, GGUF_DEFAULT_ALIGNMENT, GGUF_MAGIC, GGUF_VERSION};
pub use metadata::{GgufMetadata, GgufMetadataValue};
pub use reader::GgufFile;
pub use tensor_info::GgufTensorInfo;
pub use writer::GgufWriter;

/// Round `pos` up to the next multiple of `GGUF_DEFAULT_ALIGNMENT`.
pub(crate) fn align(pos: usize) -> usize {
    (pos + GGUF_DEFAULT_ALIGNMENT - 1) & !(GGUF_DEFAULT_ALIGNMENT - 1)
}
