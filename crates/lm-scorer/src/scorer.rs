use std::path::Path;
use std::sync::Arc;

use lm_model::{RecurrentLm, RnnLmModel, Vocab};
use lm_tensor::{ComputeBackend, CpuBackend, Tensor};
use tracing::{info, trace, warn};

use crate::config::{ScorerConfig, SpecialLabels};
use crate::error::{Result, ScorerError};

/// A loaded model together with the backend that evaluates it.
#[derive(Debug, Clone)]
struct Loaded {
    model: Arc<RnnLmModel>,
    backend: CpuBackend,
}

/// Total and per-label scores of a label sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceScore {
    /// Sum of `per_label`.
    pub total: f32,
    /// One natural-log probability per input label, followed by the
    /// end-of-sentence score.
    pub per_label: Vec<f32>,
}

/// Step-wise scorer over a recurrent language model.
///
/// A scorer is either unloaded or ready. [`LmScorer::load`] moves it to
/// ready only after the model file has been fully parsed and validated;
/// a failed load leaves it unloaded. Once ready the scorer is immutable:
/// every call takes `&self`, the caller owns every state tensor, and a
/// single scorer may be shared across threads.
#[derive(Debug, Clone, Default)]
pub struct LmScorer {
    labels: SpecialLabels,
    loaded: Option<Loaded>,
}

impl LmScorer {
    /// Unloaded scorer with the default reserved labels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Unloaded scorer with custom reserved labels.
    pub fn with_labels(labels: SpecialLabels) -> Self {
        LmScorer {
            labels,
            loaded: None,
        }
    }

    /// Ready scorer over an already loaded model. The model can be shared
    /// between any number of scorers.
    pub fn from_shared(
        model: Arc<RnnLmModel>,
        num_threads: usize,
        labels: SpecialLabels,
    ) -> Result<Self> {
        let backend = build_backend(num_threads)?;
        warn_unknown_labels(&labels, model.vocab_size());
        Ok(LmScorer {
            labels,
            loaded: Some(Loaded { model, backend }),
        })
    }

    /// Ready scorer built from a configuration with a model path.
    pub fn from_config(config: &ScorerConfig) -> Result<Self> {
        let path = config.model_path.as_ref().ok_or_else(|| {
            ScorerError::InvalidConfig("model_path is not set".to_string())
        })?;
        let mut scorer = LmScorer::with_labels(config.labels);
        scorer.load(path, config.num_threads)?;
        Ok(scorer)
    }

    /// Load a model file, using `num_threads` lanes of intra-op parallelism.
    ///
    /// # Errors
    /// `AlreadyLoaded` if a model is present, `InvalidThreads` for a zero
    /// thread count, `Load` if the file is missing, malformed or does not
    /// describe a supported recurrent LM. On error the scorer is unchanged.
    pub fn load<P: AsRef<Path>>(&mut self, path: P, num_threads: usize) -> Result<()> {
        if self.loaded.is_some() {
            return Err(ScorerError::AlreadyLoaded);
        }
        let path = path.as_ref();
        let backend = build_backend(num_threads)?;
        let model = RnnLmModel::open(path).map_err(|source| ScorerError::Load {
            path: path.to_path_buf(),
            source,
        })?;

        warn_unknown_labels(&self.labels, model.vocab_size());
        info!(
            path = %path.display(),
            threads = backend.num_threads(),
            start = self.labels.start,
            eos = self.labels.eos,
            "scorer ready"
        );
        self.loaded = Some(Loaded {
            model: Arc::new(model),
            backend,
        });
        Ok(())
    }

    fn ready(&self) -> Result<&Loaded> {
        self.loaded.as_ref().ok_or(ScorerError::NotLoaded)
    }

    /// Score `label` as the continuation of `prev_label` from `state`.
    ///
    /// Feeds `prev_label` through the model starting at `state` and returns
    /// the natural-log probability of `label` under the resulting
    /// distribution, together with the state after `prev_label`. `state` is
    /// never modified, so the same state may be expanded with many labels.
    pub fn step(&self, state: &Tensor, prev_label: u32, label: u32) -> Result<(f32, Tensor)> {
        let loaded = self.ready()?;
        let vocab_size = loaded.model.vocab_size();
        for l in [prev_label, label] {
            if l as usize >= vocab_size {
                return Err(ScorerError::LabelOutOfRange {
                    label: l,
                    vocab_size,
                });
            }
        }

        let out = loaded
            .model
            .forward_step(state, prev_label, &loaded.backend)?;
        let score = out.log_probs[label as usize];
        trace!(prev_label, label, score, "step");
        Ok((score, out.next_state))
    }

    /// Score the end-of-sentence label after `prev_label`.
    pub fn step_eos(&self, state: &Tensor, prev_label: u32) -> Result<(f32, Tensor)> {
        self.step(state, prev_label, self.labels.eos)
    }

    /// Score a whole label sequence from the zero state, starting with
    /// `start()` as the previous label and closing with `step_eos`.
    pub fn score_sequence(&self, labels: &[u32]) -> Result<SequenceScore> {
        let mut state = self.zero_state()?;
        let mut prev = self.labels.start;
        let mut per_label = Vec::with_capacity(labels.len() + 1);

        for &label in labels {
            let (score, next) = self.step(&state, prev, label)?;
            per_label.push(score);
            state = next;
            prev = label;
        }
        let (eos_score, _) = self.step_eos(&state, prev)?;
        per_label.push(eos_score);

        Ok(SequenceScore {
            total: per_label.iter().sum(),
            per_label,
        })
    }

    /// Label a decoder passes as `prev_label` on the first step.
    pub fn start(&self) -> u32 {
        self.labels.start
    }

    pub fn sos(&self) -> u32 {
        self.labels.sos
    }

    pub fn eos(&self) -> u32 {
        self.labels.eos
    }

    pub fn labels(&self) -> SpecialLabels {
        self.labels
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn vocab_size(&self) -> Result<usize> {
        Ok(self.ready()?.model.vocab_size())
    }

    pub fn num_threads(&self) -> Result<usize> {
        Ok(self.ready()?.backend.num_threads())
    }

    /// All-zeros state for the loaded model.
    pub fn zero_state(&self) -> Result<Tensor> {
        Ok(self.ready()?.model.zero_state())
    }

    /// Shared handle to the loaded model.
    pub fn model(&self) -> Result<Arc<RnnLmModel>> {
        Ok(Arc::clone(&self.ready()?.model))
    }

    /// Word list stored in the model file, if any.
    pub fn vocab(&self) -> Result<Option<&Vocab>> {
        Ok(self.ready()?.model.vocab())
    }
}

fn build_backend(num_threads: usize) -> Result<CpuBackend> {
    CpuBackend::with_threads(num_threads).map_err(|source| ScorerError::InvalidThreads {
        threads: num_threads,
        source,
    })
}

fn warn_unknown_labels(labels: &SpecialLabels, vocab_size: usize) {
    for (name, label) in labels.iter() {
        if label as usize >= vocab_size {
            warn!(
                name,
                label, vocab_size, "reserved label is outside the model vocabulary"
            );
        }
    }
}
