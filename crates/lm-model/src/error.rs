use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid GGUF magic: expected 'GGUF', got {0:?}")]
    InvalidMagic([u8; 4]),
    #[error("unsupported GGUF version: {0}")]
    UnsupportedVersion(u32),
    #[error("missing metadata key: {0}")]
    MissingKey(String),
    #[error("type mismatch for key '{key}': expected {expected}, got {got}")]
    TypeMismatch {
        key: String,
        expected: String,
        got: String,
    },
    #[error("unsupported GGUF type ID: {0}")]
    UnsupportedGgufType(u32),
    #[error("tensor not found: {0}")]
    TensorNotFound(String),
    #[error("tensor '{name}' data out of bounds: needs bytes {start}..{end}, file has {len}")]
    TruncatedTensor {
        name: String,
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("unsupported architecture: {0}")]
    UnsupportedArchitecture(String),
    #[error("unsupported cell type: {0}")]
    UnsupportedCell(String),
    #[error("invalid model config: {0}")]
    InvalidConfig(String),
    #[error("tensor '{name}' has shape {got:?}, expected {expected:?}")]
    IncompatibleTensor {
        name: String,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("label {label} out of range for vocabulary of size {vocab_size}")]
    LabelOutOfRange { label: u32, vocab_size: usize },
    #[error("state has shape {got:?}, model expects {expected:?}")]
    StateShape {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("vocabulary error: {0}")]
    VocabError(String),
    #[error("tensor error: {0}")]
    TensorError(#[from] lm_tensor::TensorError),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
