use thiserror::Error;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    #[error("matmul of [{m}x{k}] by [{k}x{n}] given buffers of {a_len} and {b_len} elements")]
    MatmulMismatch {
        m: usize,
        k: usize,
        n: usize,
        a_len: usize,
        b_len: usize,
    },
    #[error("invalid thread count {0}: at least one thread is required")]
    InvalidThreads(usize),
    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;
