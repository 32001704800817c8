//! Recurrent language-model scorer.
//!
//! An [`LmScorer`] loads a recurrent LM from a GGUF file and scores one
//! candidate label at a time for an external decoder. The decoder owns every
//! state tensor; the scorer only transforms `(state, prev_label, label)` into
//! `(score, next_state)`.

pub mod config;
pub mod error;
pub mod scorer;

pub use crate::config::{ScorerConfig, SpecialLabels, DEFAULT_SPECIAL_LABEL};
pub use error::{Result, ScorerError};
pub use scorer::{LmScorer, SequenceScore};
