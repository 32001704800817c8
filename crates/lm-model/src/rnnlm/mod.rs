pub mod config;
pub mod layers;

mod cell;

pub use config::{CellType, RnnLmConfig, ARCHITECTURE};
pub use layers::{Projection, RecurrentLayer, RnnLmWeights};

use std::path::Path;

use lm_tensor::{ComputeBackend, DType, Shape, Tensor};
use tracing::info;

use crate::architecture::{RecurrentLm, StepOutput};
use crate::error::{ModelError, Result};
use crate::gguf::metadata::GgufMetadataValue;
use crate::gguf::reader::GgufFile;
use crate::gguf::writer::GgufWriter;
use crate::vocab::{Vocab, TOKENS_KEY};

/// A stacked recurrent language model.
///
/// Holds the configuration, f32 weights and the optional word list. The
/// model is immutable after construction; per-hypothesis memory lives in
/// state tensors of shape `[2, n_layers, hidden_length]` where slot 0 holds
/// each layer's hidden output and slot 1 its memory cell.
#[derive(Debug, Clone)]
pub struct RnnLmModel {
    config: RnnLmConfig,
    weights: RnnLmWeights,
    vocab: Option<Vocab>,
}

impl RnnLmModel {
    /// Assemble a model from parts, checking that they agree.
    pub fn new(config: RnnLmConfig, weights: RnnLmWeights, vocab: Option<Vocab>) -> Result<Self> {
        config.validate()?;
        weights.validate(&config)?;
        if let Some(v) = &vocab {
            if v.len() != config.n_vocab {
                return Err(ModelError::VocabError(format!(
                    "word list has {} entries but vocab_size is {}",
                    v.len(),
                    config.n_vocab
                )));
            }
        }
        Ok(RnnLmModel {
            config,
            weights,
            vocab,
        })
    }

    /// Load a recurrent LM from a parsed GGUF file.
    pub fn from_gguf(gguf: &GgufFile) -> Result<RnnLmModel> {
        let config = RnnLmConfig::from_gguf(&gguf.metadata)?;
        let weights = RnnLmWeights::from_gguf(gguf, &config)?;
        let vocab = Vocab::from_gguf(&gguf.metadata)?;
        RnnLmModel::new(config, weights, vocab)
    }

    /// Open, parse and validate a model file.
    pub fn open(path: &Path) -> Result<RnnLmModel> {
        let gguf = GgufFile::open(path)?;
        let model = RnnLmModel::from_gguf(&gguf)?;
        info!(
            path = %path.display(),
            cell = %model.config.cell_type,
            vocab = model.config.n_vocab,
            layers = model.config.n_layers,
            hidden = model.config.hidden_length,
            "recurrent LM loaded"
        );
        Ok(model)
    }

    /// Build a GGUF writer holding this model, with weights stored as `dtype`.
    pub fn to_gguf(&self, dtype: DType) -> GgufWriter {
        let cfg = &self.config;
        let mut writer = GgufWriter::new();
        writer
            .add_metadata(
                "general.architecture",
                GgufMetadataValue::String(ARCHITECTURE.to_string()),
            )
            .add_metadata(
                "rnnlm.cell_type",
                GgufMetadataValue::String(cfg.cell_type.as_str().to_string()),
            )
            .add_metadata("rnnlm.vocab_size", GgufMetadataValue::U32(cfg.n_vocab as u32))
            .add_metadata("rnnlm.layer_count", GgufMetadataValue::U32(cfg.n_layers as u32))
            .add_metadata("rnnlm.input_length", GgufMetadataValue::U32(cfg.input_length as u32))
            .add_metadata("rnnlm.hidden_length", GgufMetadataValue::U32(cfg.hidden_length as u32))
            .add_metadata("rnnlm.output_length", GgufMetadataValue::U32(cfg.output_length as u32));
        if let Some(v) = &self.vocab {
            writer.add_metadata(TOKENS_KEY, v.to_metadata());
        }
        self.weights.add_to_gguf(&mut writer, dtype);
        writer
    }

    /// Write the model to `path` as a GGUF file.
    pub fn save(&self, path: &Path, dtype: DType) -> Result<()> {
        self.to_gguf(dtype).write_file(path)
    }

    pub fn config(&self) -> &RnnLmConfig {
        &self.config
    }

    pub fn weights(&self) -> &RnnLmWeights {
        &self.weights
    }

    pub fn vocab(&self) -> Option<&Vocab> {
        self.vocab.as_ref()
    }
}

impl RecurrentLm for RnnLmModel {
    /// Run one step of the stacked recurrence.
    ///
    /// Looks up the embedding of `label`, advances every layer from its
    /// slice of `state`, applies the optional projection and the output
    /// layer, and returns natural-log probabilities over the vocabulary.
    fn forward_step(
        &self,
        state: &Tensor,
        label: u32,
        backend: &dyn ComputeBackend,
    ) -> Result<StepOutput> {
        let cfg = &self.config;
        let hidden = cfg.hidden_length;
        let n_layers = cfg.n_layers;

        let state_dims = cfg.state_dims();
        if state.shape().dims() != state_dims.as_slice() {
            return Err(ModelError::StateShape {
                expected: state_dims,
                got: state.shape().dims().to_vec(),
            });
        }

        let mut x: Vec<f32> = self
            .weights
            .token_embd
            .row(label as usize)
            .ok_or(ModelError::LabelOutOfRange {
                label,
                vocab_size: cfg.n_vocab,
            })?
            .to_vec();

        let prev = state.data_f32();
        let mut next = vec![0.0f32; prev.len()];
        let cell_base = n_layers * hidden;

        for (l, layer) in self.weights.layers.iter().enumerate() {
            let h_range = l * hidden..(l + 1) * hidden;
            let c_range = cell_base + l * hidden..cell_base + (l + 1) * hidden;

            let (h_new, c_new) = cell::step(
                cfg.cell_type,
                layer,
                &x,
                &prev[h_range.clone()],
                &prev[c_range.clone()],
                backend,
            )?;

            next[h_range].copy_from_slice(&h_new);
            next[c_range].copy_from_slice(&c_new);
            x = h_new;
        }

        if let Some(p) = &self.weights.proj {
            x = cell::linear(
                backend,
                p.weight.data_f32(),
                Some(p.bias.data_f32()),
                &x,
                cfg.output_length,
            )?;
        }

        let logits = cell::linear(
            backend,
            self.weights.output.data_f32(),
            self.weights.output_bias.as_ref().map(|b| b.data_f32()),
            &x,
            cfg.n_vocab,
        )?;
        let log_probs = backend.log_softmax(&logits, cfg.n_vocab)?;

        Ok(StepOutput {
            log_probs,
            next_state: Tensor::new(next, Shape::new(state_dims)),
        })
    }

    fn vocab_size(&self) -> usize {
        self.config.n_vocab
    }

    fn state_shape(&self) -> Shape {
        Shape::new(self.config.state_dims())
    }
}
