use std::fmt::Debug;

use crate::error::Result;

/// Trait for pluggable compute backends.
///
/// All operations work on f32 slices. Data is passed in as slices and
/// returned as owned vectors, so a backend never holds on to caller data.
///
/// Implementations must be safe to call concurrently through a shared
/// reference: scorers share one backend between all callers stepping their
/// own states, and no locking happens above this trait.
pub trait ComputeBackend: Send + Sync + Debug {
    /// Returns the name of this backend (e.g., "cpu").
    fn name(&self) -> &str;

    /// Number of parallel lanes this backend uses inside a single operation.
    fn num_threads(&self) -> usize;

    /// Matrix multiplication: C = A @ B.
    ///
    /// - `a`: row-major data of shape [m, k]
    /// - `b`: row-major data of shape [k, n]
    /// - Returns: row-major data of shape [m, n]
    fn matmul(&self, a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Result<Vec<f32>>;

    /// Element-wise addition: result[i] = a[i] + b[i].
    fn add(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>>;

    /// Element-wise subtraction: result[i] = a[i] - b[i].
    fn sub(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>>;

    /// Element-wise multiplication: result[i] = a[i] * b[i].
    fn mul(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>>;

    /// Logistic sigmoid: result[i] = 1 / (1 + exp(-x[i])).
    fn sigmoid(&self, x: &[f32]) -> Result<Vec<f32>>;

    /// Hyperbolic tangent.
    fn tanh(&self, x: &[f32]) -> Result<Vec<f32>>;

    /// Natural-log softmax over chunks of `n_vocab` elements.
    ///
    /// For each chunk: result[i] = x[i] - max(x) - ln(sum(exp(x[j] - max(x))))
    fn log_softmax(&self, x: &[f32], n_vocab: usize) -> Result<Vec<f32>>;
}
