use lm_tensor::{DType, Tensor};

use super::config::RnnLmConfig;
use crate::error::{ModelError, Result};
use crate::gguf::reader::GgufFile;
use crate::gguf::writer::GgufWriter;

/// Weight tensors for one recurrent layer, PyTorch gate layout.
#[derive(Debug, Clone)]
pub struct RecurrentLayer {
    /// Input-to-hidden weights, shape [gates * hidden, in].
    pub weight_ih: Tensor,
    /// Hidden-to-hidden weights, shape [gates * hidden, hidden].
    pub weight_hh: Tensor,
    /// Shape [gates * hidden].
    pub bias_ih: Tensor,
    /// Shape [gates * hidden].
    pub bias_hh: Tensor,
}

/// Linear bottleneck between the top recurrent layer and the output layer.
#[derive(Debug, Clone)]
pub struct Projection {
    /// Shape [output, hidden].
    pub weight: Tensor,
    /// Shape [output].
    pub bias: Tensor,
}

/// All weight tensors for a recurrent LM.
#[derive(Debug, Clone)]
pub struct RnnLmWeights {
    /// Embedding table, shape [n_vocab, input].
    pub token_embd: Tensor,
    pub layers: Vec<RecurrentLayer>,
    pub proj: Option<Projection>,
    /// Output layer weights, shape [n_vocab, output].
    pub output: Tensor,
    /// Output layer bias, shape [n_vocab]; absent means zero.
    pub output_bias: Option<Tensor>,
}

fn layer_name(i: usize, what: &str) -> String {
    format!("blk.{}.{}", i, what)
}

fn check(name: &str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    if tensor.shape().dims() != expected {
        return Err(ModelError::IncompatibleTensor {
            name: name.to_string(),
            expected: expected.to_vec(),
            got: tensor.shape().dims().to_vec(),
        });
    }
    Ok(())
}

impl RnnLmWeights {
    /// Load all weights from a parsed GGUF file and check them against `config`.
    ///
    /// GGUF tensor names:
    /// - `token_embd.weight`
    /// - `blk.{i}.weight_ih`, `blk.{i}.weight_hh`, `blk.{i}.bias_ih`, `blk.{i}.bias_hh`
    /// - `proj.weight`, `proj.bias` (optional when output == hidden)
    /// - `output.weight`, `output.bias` (bias optional)
    pub fn from_gguf(gguf: &GgufFile, config: &RnnLmConfig) -> Result<RnnLmWeights> {
        let token_embd = gguf.get_tensor_f32("token_embd.weight")?;

        let mut layers = Vec::with_capacity(config.n_layers);
        for i in 0..config.n_layers {
            layers.push(RecurrentLayer {
                weight_ih: gguf.get_tensor_f32(&layer_name(i, "weight_ih"))?,
                weight_hh: gguf.get_tensor_f32(&layer_name(i, "weight_hh"))?,
                bias_ih: gguf.get_tensor_f32(&layer_name(i, "bias_ih"))?,
                bias_hh: gguf.get_tensor_f32(&layer_name(i, "bias_hh"))?,
            });
        }

        let proj = match gguf.get_optional_tensor_f32("proj.weight")? {
            Some(weight) => Some(Projection {
                weight,
                bias: gguf.get_tensor_f32("proj.bias")?,
            }),
            None => None,
        };

        let weights = RnnLmWeights {
            token_embd,
            layers,
            proj,
            output: gguf.get_tensor_f32("output.weight")?,
            output_bias: gguf.get_optional_tensor_f32("output.bias")?,
        };
        weights.validate(config)?;
        Ok(weights)
    }

    /// Check every tensor's shape against `config`.
    pub fn validate(&self, config: &RnnLmConfig) -> Result<()> {
        let hidden = config.hidden_length;
        let gated = config.cell_type.gates() * hidden;

        check("token_embd.weight", &self.token_embd, &[config.n_vocab, config.input_length])?;

        if self.layers.len() != config.n_layers {
            return Err(ModelError::InvalidConfig(format!(
                "config has {} layers but {} were provided",
                config.n_layers,
                self.layers.len()
            )));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            let input = config.layer_input_length(i);
            check(&layer_name(i, "weight_ih"), &layer.weight_ih, &[gated, input])?;
            check(&layer_name(i, "weight_hh"), &layer.weight_hh, &[gated, hidden])?;
            check(&layer_name(i, "bias_ih"), &layer.bias_ih, &[gated])?;
            check(&layer_name(i, "bias_hh"), &layer.bias_hh, &[gated])?;
        }

        match &self.proj {
            Some(p) => {
                check("proj.weight", &p.weight, &[config.output_length, hidden])?;
                check("proj.bias", &p.bias, &[config.output_length])?;
            }
            None if config.output_length != hidden => {
                return Err(ModelError::TensorNotFound("proj.weight".to_string()));
            }
            None => {}
        }

        check("output.weight", &self.output, &[config.n_vocab, config.output_length])?;
        if let Some(bias) = &self.output_bias {
            check("output.bias", bias, &[config.n_vocab])?;
        }
        Ok(())
    }

    /// Add every tensor to `writer` under its GGUF name.
    pub fn add_to_gguf(&self, writer: &mut GgufWriter, dtype: DType) {
        writer.add_tensor("token_embd.weight", &self.token_embd, dtype);
        for (i, layer) in self.layers.iter().enumerate() {
            writer
                .add_tensor(&layer_name(i, "weight_ih"), &layer.weight_ih, dtype)
                .add_tensor(&layer_name(i, "weight_hh"), &layer.weight_hh, dtype)
                .add_tensor(&layer_name(i, "bias_ih"), &layer.bias_ih, dtype)
                .add_tensor(&layer_name(i, "bias_hh"), &layer.bias_hh, dtype);
        }
        if let Some(p) = &self.proj {
            writer
                .add_tensor("proj.weight", &p.weight, dtype)
                .add_tensor("proj.bias", &p.bias, dtype);
        }
        writer.add_tensor("output.weight", &self.output, dtype);
        if let Some(bias) = &self.output_bias {
            writer.add_tensor("output.bias", bias, dtype);
        }
    }
}
