use lm_tensor::{ComputeBackend, Shape, Tensor};

/// Output of one recurrent step.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// Natural-log probabilities over the vocabulary for the next label.
    pub log_probs: Vec<f32>,
    /// The state after consuming the input label.
    pub next_state: Tensor,
}

/// Trait for recurrent language models that score one label at a time.
///
/// Implementations are immutable once loaded: `forward_step` takes `&self`
/// and all per-hypothesis memory travels in the explicit state tensor. The
/// `Send + Sync` bound is what lets one loaded model serve concurrent
/// callers that each own their states; implementations must not hide
/// mutable state behind interior mutability.
pub trait RecurrentLm: Send + Sync {
    /// Consume `label` from `state` and return the next-label distribution
    /// together with the new state. `state` is never modified.
    fn forward_step(
        &self,
        state: &Tensor,
        label: u32,
        backend: &dyn ComputeBackend,
    ) -> crate::Result<StepOutput>;

    /// Returns the vocabulary size (number of output log-probabilities).
    fn vocab_size(&self) -> usize;

    /// Shape every state tensor for this model must have.
    fn state_shape(&self) -> Shape;

    /// The all-zeros state a new hypothesis starts from.
    fn zero_state(&self) -> Tensor {
        Tensor::zeros(self.state_shape())
    }
}
