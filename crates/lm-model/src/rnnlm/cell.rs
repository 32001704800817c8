use lm_tensor::ComputeBackend;

use super::config::CellType;
use super::layers::RecurrentLayer;
use crate::error::Result;

/// Affine map `W @ x + b` for a row-major `[rows, x.len()]` weight.
pub(crate) fn linear(
    backend: &dyn ComputeBackend,
    weight: &[f32],
    bias: Option<&[f32]>,
    x: &[f32],
    rows: usize,
) -> Result<Vec<f32>> {
    let y = backend.matmul(weight, x, rows, x.len(), 1)?;
    match bias {
        Some(b) => Ok(backend.add(&y, b)?),
        None => Ok(y),
    }
}

/// Advance one layer by one time step.
///
/// `h` and `c` are this layer's slices of the incoming state; the returned
/// pair is the new (hidden, cell). Cells without a memory cell return zeros
/// for `c`.
pub(crate) fn step(
    cell: CellType,
    layer: &RecurrentLayer,
    x: &[f32],
    h: &[f32],
    c: &[f32],
    backend: &dyn ComputeBackend,
) -> Result<(Vec<f32>, Vec<f32>)> {
    let hidden = h.len();
    let rows = cell.gates() * hidden;

    let gi = linear(
        backend,
        layer.weight_ih.data_f32(),
        Some(layer.bias_ih.data_f32()),
        x,
        rows,
    )?;
    let gh = linear(
        backend,
        layer.weight_hh.data_f32(),
        Some(layer.bias_hh.data_f32()),
        h,
        rows,
    )?;
    let gate = |v: &[f32], k: usize| v[k * hidden..(k + 1) * hidden].to_vec();

    match cell {
        CellType::Rnn => {
            let h_new = backend.tanh(&backend.add(&gi, &gh)?)?;
            Ok((h_new, vec![0.0; hidden]))
        }
        CellType::Gru => {
            let r = backend.sigmoid(&backend.add(&gate(&gi, 0), &gate(&gh, 0))?)?;
            let z = backend.sigmoid(&backend.add(&gate(&gi, 1), &gate(&gh, 1))?)?;
            // The reset gate scales only the hidden contribution of n.
            let n = backend.tanh(&backend.add(&gate(&gi, 2), &backend.mul(&r, &gate(&gh, 2))?)?)?;
            // h' = (1 - z) * n + z * h  ==  n + z * (h - n)
            let h_new = backend.add(&n, &backend.mul(&z, &backend.sub(h, &n)?)?)?;
            Ok((h_new, vec![0.0; hidden]))
        }
        CellType::Lstm => {
            let pre = backend.add(&gi, &gh)?;
            let i = backend.sigmoid(&gate(&pre, 0))?;
            let f = backend.sigmoid(&gate(&pre, 1))?;
            let g = backend.tanh(&gate(&pre, 2))?;
            let o = backend.sigmoid(&gate(&pre, 3))?;
            let c_new = backend.add(&backend.mul(&f, c)?, &backend.mul(&i, &g)?)?;
            let h_new = backend.mul(&o, &backend.tanh(&c_new)?)?;
            Ok((h_new, c_new))
        }
    }
}
