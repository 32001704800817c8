//! Element-wise activations and the log-softmax kernel.

pub(crate) fn sigmoid(x: &[f32]) -> Vec<f32> {
    x.iter().map(|&v| 1.0 / (1.0 + (-v).exp())).collect()
}

pub(crate) fn tanh(x: &[f32]) -> Vec<f32> {
    x.iter().map(|v| v.tanh()).collect()
}

/// Log-softmax of one chunk, shifted by the max for numerical stability.
pub(crate) fn log_softmax_chunk(chunk: &[f32], out: &mut [f32]) {
    let max_val = chunk.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = chunk.iter().map(|&v| (v - max_val).exp()).sum();
    let log_sum = sum.ln();
    for (o, &v) in out.iter_mut().zip(chunk) {
        *o = v - max_val - log_sum;
    }
}
