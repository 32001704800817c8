use std::path::PathBuf;

use lm_model::ModelError;
use lm_tensor::TensorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("failed to load model from {}: {source}", path.display())]
    Load { path: PathBuf, source: ModelError },

    #[error("cannot use {threads} compute threads: {source}")]
    InvalidThreads { threads: usize, source: TensorError },

    #[error("a model is already loaded")]
    AlreadyLoaded,

    #[error("no model loaded")]
    NotLoaded,

    #[error("label {label} out of range for vocabulary of {vocab_size}")]
    LabelOutOfRange { label: u32, vocab_size: usize },

    #[error("step failed: {0}")]
    Runtime(#[from] ModelError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ScorerError {
    /// True when the error was caused by how the scorer was called rather
    /// than by the model file or the computation.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            ScorerError::AlreadyLoaded
                | ScorerError::NotLoaded
                | ScorerError::LabelOutOfRange { .. }
                | ScorerError::InvalidThreads { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ScorerError>;
