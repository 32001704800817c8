mod matmul;
mod unary;

use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::backend::ComputeBackend;
use crate::error::{Result, TensorError};

/// Pure-Rust CPU compute backend.
///
/// With one thread every operation runs on the caller's thread. With more,
/// the backend owns a dedicated rayon pool of that size and splits matrix
/// rows across it; the pool is shared by clones of the backend.
#[derive(Debug, Clone)]
pub struct CpuBackend {
    threads: usize,
    pool: Option<Arc<ThreadPool>>,
}

impl CpuBackend {
    /// Single-threaded backend.
    pub fn new() -> Self {
        CpuBackend {
            threads: 1,
            pool: None,
        }
    }

    /// Backend using up to `threads` lanes for intra-op parallelism.
    ///
    /// # Errors
    /// Returns an error for `threads == 0` or when the pool cannot be built.
    pub fn with_threads(threads: usize) -> Result<Self> {
        match threads {
            0 => Err(TensorError::InvalidThreads(threads)),
            1 => Ok(Self::new()),
            n => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("lm-cpu-{}", i))
                    .build()?;
                debug!(threads = n, "cpu backend thread pool created");
                Ok(CpuBackend {
                    threads: n,
                    pool: Some(Arc::new(pool)),
                })
            }
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn check_same_len(a: &[f32], b: &[f32]) -> Result<()> {
    if a.len() != b.len() {
        return Err(TensorError::ShapeMismatch {
            expected: vec![a.len()],
            got: vec![b.len()],
        });
    }
    Ok(())
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        "cpu"
    }

    fn num_threads(&self) -> usize {
        self.threads
    }

    fn matmul(&self, a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Result<Vec<f32>> {
        if a.len() != m * k || b.len() != k * n {
            return Err(TensorError::MatmulMismatch {
                m,
                k,
                n,
                a_len: a.len(),
                b_len: b.len(),
            });
        }

        Ok(match &self.pool {
            Some(pool) => matmul::matmul_pooled(pool, a, b, m, k, n),
            None => matmul::matmul_serial(a, b, m, k, n),
        })
    }

    fn add(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>> {
        check_same_len(a, b)?;
        Ok(a.iter().zip(b.iter()).map(|(x, y)| x + y).collect())
    }

    fn sub(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>> {
        check_same_len(a, b)?;
        Ok(a.iter().zip(b.iter()).map(|(x, y)| x - y).collect())
    }

    fn mul(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>> {
        check_same_len(a, b)?;
        Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).collect())
    }

    fn sigmoid(&self, x: &[f32]) -> Result<Vec<f32>> {
        Ok(unary::sigmoid(x))
    }

    fn tanh(&self, x: &[f32]) -> Result<Vec<f32>> {
        Ok(unary::tanh(x))
    }

    fn log_softmax(&self, x: &[f32], n_vocab: usize) -> Result<Vec<f32>> {
        if n_vocab == 0 {
            return Err(TensorError::Other(
                "log_softmax: n_vocab must be > 0".to_string(),
            ));
        }
        if x.len() % n_vocab != 0 {
            return Err(TensorError::Other(format!(
                "log_softmax: x.len()={} is not a multiple of n_vocab={}",
                x.len(),
                n_vocab
            )));
        }

        let mut result = vec![0.0f32; x.len()];
        for (chunk, out) in x.chunks(n_vocab).zip(result.chunks_mut(n_vocab)) {
            unary::log_softmax_chunk(chunk, out);
        }
        Ok(result)
    }
}
