//! Row-major matmul kernels.
//!
//! Each output row is produced by one task with the inner sum taken in the
//! same order, so serial and pooled results are bit-identical.

use rayon::prelude::*;
use rayon::ThreadPool;

/// Rows handed to a single rayon task. Matrix-vector products have one
/// element per row, so tiny tasks would be dominated by scheduling.
const MIN_ROWS_PER_TASK: usize = 64;

fn row(a: &[f32], b: &[f32], i: usize, k: usize, n: usize, out: &mut [f32]) {
    for (j, slot) in out.iter_mut().enumerate() {
        let mut sum = 0.0f32;
        for p in 0..k {
            sum += a[i * k + p] * b[p * n + j];
        }
        *slot = sum;
    }
}

pub(crate) fn matmul_serial(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let mut c = vec![0.0f32; m * n];
    if n == 0 {
        return c;
    }
    for (i, out) in c.chunks_mut(n).enumerate() {
        row(a, b, i, k, n, out);
    }
    c
}

pub(crate) fn matmul_pooled(
    pool: &ThreadPool,
    a: &[f32],
    b: &[f32],
    m: usize,
    k: usize,
    n: usize,
) -> Vec<f32> {
    let mut c = vec![0.0f32; m * n];
    if n == 0 {
        return c;
    }
    pool.install(|| {
        c.par_chunks_mut(n)
            .enumerate()
            .with_min_len(MIN_ROWS_PER_TASK)
            .for_each(|(i, out)| row(a, b, i, k, n, out));
    });
    c
}
