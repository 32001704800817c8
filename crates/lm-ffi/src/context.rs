use lm_scorer::{LmScorer, SpecialLabels};
use lm_tensor::Tensor;

/// Opaque scorer handle. Owns the loaded model and its compute backend.
pub struct LMScorer {
    pub scorer: LmScorer,
}

impl LMScorer {
    pub fn new(labels: SpecialLabels) -> Self {
        Self {
            scorer: LmScorer::with_labels(labels),
        }
    }
}

/// Opaque recurrent state handle. Owned by the caller; every step returns a
/// new one and leaves its input untouched.
pub struct LMState {
    pub tensor: Tensor,
}
