use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{Result, ScorerError};

/// Label used for every reserved identifier unless configured otherwise.
pub const DEFAULT_SPECIAL_LABEL: u32 = 99;

/// Reserved label identifiers agreed between the model producer and the
/// decoder. They are configuration, never read from the model file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SpecialLabels {
    /// Sentence start.
    pub sos: u32,
    /// Sentence end, scored by `step_eos`.
    pub eos: u32,
    /// `prev_label` a decoder uses for the first step of a hypothesis.
    pub start: u32,
}

impl Default for SpecialLabels {
    fn default() -> Self {
        Self {
            sos: DEFAULT_SPECIAL_LABEL,
            eos: DEFAULT_SPECIAL_LABEL,
            start: DEFAULT_SPECIAL_LABEL,
        }
    }
}

impl SpecialLabels {
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&'static str, u32)> {
        [("sos", self.sos), ("eos", self.eos), ("start", self.start)].into_iter()
    }
}

/// Scorer configuration.
///
/// ```toml
/// model_path = "models/rnnlm.gguf"
/// num_threads = 4
///
/// [labels]
/// sos = 0
/// eos = 2
/// start = 0
/// ```
///
/// Every key can be overridden from the environment with the `LM_SCORER__`
/// prefix, e.g. `LM_SCORER__NUM_THREADS=2` or `LM_SCORER__LABELS__EOS=2`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScorerConfig {
    #[serde(default)]
    pub model_path: Option<PathBuf>,
    /// Intra-op compute threads (default: 1)
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    #[serde(default)]
    pub labels: SpecialLabels,
}

fn default_num_threads() -> usize {
    1
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            num_threads: default_num_threads(),
            labels: SpecialLabels::default(),
        }
    }
}

impl ScorerConfig {
    /// Load configuration from a TOML file, then apply `LM_SCORER__*`
    /// environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Self::environment())
            .build()?;
        Self::finish(config)
    }

    /// Configuration from defaults and the environment only.
    pub fn from_env() -> Result<Self> {
        let config = Config::builder().add_source(Self::environment()).build()?;
        Self::finish(config)
    }

    fn environment() -> Environment {
        Environment::with_prefix("LM_SCORER")
            .separator("__")
            .try_parsing(true)
    }

    fn finish(config: Config) -> Result<Self> {
        let cfg: ScorerConfig = config.try_deserialize()?;
        if cfg.num_threads == 0 {
            return Err(ScorerError::InvalidConfig(
                "num_threads must be > 0".to_string(),
            ));
        }
        Ok(cfg)
    }
}
