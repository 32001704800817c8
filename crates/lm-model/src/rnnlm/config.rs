use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, Result};
use crate::gguf::metadata::GgufMetadata;

/// Value of `general.architecture` for recurrent LM files.
pub const ARCHITECTURE: &str = "rnnlm";

/// Recurrent cell flavour, following the PyTorch gate layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    /// Elman cell with tanh non-linearity.
    Rnn,
    /// Gated recurrent unit, gates ordered r, z, n.
    Gru,
    /// Long short-term memory, gates ordered i, f, g, o.
    Lstm,
}

impl CellType {
    /// Number of stacked gate blocks in the input/hidden weight matrices.
    pub fn gates(&self) -> usize {
        match self {
            CellType::Rnn => 1,
            CellType::Gru => 3,
            CellType::Lstm => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CellType::Rnn => "rnn",
            CellType::Gru => "gru",
            CellType::Lstm => "lstm",
        }
    }
}

impl FromStr for CellType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rnn" => Ok(CellType::Rnn),
            "gru" => Ok(CellType::Gru),
            "lstm" => Ok(CellType::Lstm),
            other => Err(ModelError::UnsupportedCell(other.to_string())),
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hyperparameters of a stacked recurrent LM, parsed from GGUF metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RnnLmConfig {
    pub cell_type: CellType,
    pub n_vocab: usize,
    pub n_layers: usize,
    /// Embedding dimension fed to the first layer.
    pub input_length: usize,
    /// Hidden size of every recurrent layer.
    pub hidden_length: usize,
    /// Size of the vector fed to the output layer (after the optional projection).
    pub output_length: usize,
}

impl RnnLmConfig {
    /// Parse the configuration from GGUF metadata.
    ///
    /// Reads the following keys:
    /// - `general.architecture` (must be `rnnlm`)
    /// - `rnnlm.cell_type` -> cell_type
    /// - `rnnlm.vocab_size` -> n_vocab
    /// - `rnnlm.layer_count` -> n_layers
    /// - `rnnlm.input_length`, `rnnlm.hidden_length`, `rnnlm.output_length`
    pub fn from_gguf(metadata: &GgufMetadata) -> Result<RnnLmConfig> {
        let arch = metadata.get_string("general.architecture")?;
        if arch != ARCHITECTURE {
            return Err(ModelError::UnsupportedArchitecture(arch.to_string()));
        }

        let config = RnnLmConfig {
            cell_type: metadata.get_string("rnnlm.cell_type")?.parse()?,
            n_vocab: metadata.get_usize("rnnlm.vocab_size")?,
            n_layers: metadata.get_usize("rnnlm.layer_count")?,
            input_length: metadata.get_usize("rnnlm.input_length")?,
            hidden_length: metadata.get_usize("rnnlm.hidden_length")?,
            output_length: metadata.get_usize("rnnlm.output_length")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject zero-sized dimensions.
    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("vocab_size", self.n_vocab),
            ("layer_count", self.n_layers),
            ("input_length", self.input_length),
            ("hidden_length", self.hidden_length),
            ("output_length", self.output_length),
        ];
        for (name, value) in dims {
            if value == 0 {
                return Err(ModelError::InvalidConfig(format!("{} must be > 0", name)));
            }
        }
        Ok(())
    }

    /// Input width of layer `layer`.
    pub fn layer_input_length(&self, layer: usize) -> usize {
        if layer == 0 {
            self.input_length
        } else {
            self.hidden_length
        }
    }

    /// State tensor dims: `[2, n_layers, hidden_length]` (hidden, cell).
    pub fn state_dims(&self) -> Vec<usize> {
        vec![2, self.n_layers, self.hidden_length]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gguf::metadata::GgufMetadataValue;

    fn metadata(cell: &str) -> GgufMetadata {
        let mut md = GgufMetadata::default();
        let mut put = |k: &str, v: GgufMetadataValue| {
            md.entries.insert(k.to_string(), v);
        };
        put("general.architecture", GgufMetadataValue::String("rnnlm".into()));
        put("rnnlm.cell_type", GgufMetadataValue::String(cell.into()));
        put("rnnlm.vocab_size", GgufMetadataValue::U32(100));
        put("rnnlm.layer_count", GgufMetadataValue::U32(2));
        put("rnnlm.input_length", GgufMetadataValue::U32(16));
        put("rnnlm.hidden_length", GgufMetadataValue::U32(32));
        put("rnnlm.output_length", GgufMetadataValue::U64(8));
        md
    }

    #[test]
    fn test_from_gguf() {
        let cfg = RnnLmConfig::from_gguf(&metadata("LSTM")).unwrap();
        assert_eq!(cfg.cell_type, CellType::Lstm);
        assert_eq!(cfg.n_vocab, 100);
        assert_eq!(cfg.layer_input_length(0), 16);
        assert_eq!(cfg.layer_input_length(1), 32);
        assert_eq!(cfg.state_dims(), vec![2, 2, 32]);
    }

    #[test]
    fn test_unknown_cell() {
        assert!(matches!(
            RnnLmConfig::from_gguf(&metadata("transformer")),
            Err(ModelError::UnsupportedCell(_))
        ));
    }

    #[test]
    fn test_wrong_architecture() {
        let mut md = metadata("gru");
        md.entries.insert(
            "general.architecture".to_string(),
            GgufMetadataValue::String("llama".into()),
        );
        assert!(matches!(
            RnnLmConfig::from_gguf(&md),
            Err(ModelError::UnsupportedArchitecture(a)) if a == "llama"
        ));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let mut md = metadata("gru");
        md.entries
            .insert("rnnlm.layer_count".to_string(), GgufMetadataValue::U32(0));
        assert!(matches!(
            RnnLmConfig::from_gguf(&md),
            Err(ModelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_gate_counts() {
        assert_eq!(CellType::Rnn.gates(), 1);
        assert_eq!(CellType::Gru.gates(), 3);
        assert_eq!(CellType::Lstm.gates(), 4);
        assert_eq!(CellType::Gru.to_string(), "gru");
    }
}
