use std::collections::HashMap;

use crate::error::{ModelError, Result};
use crate::gguf::metadata::{GgufMetadata, GgufMetadataValue};

/// Metadata key holding the word list.
pub const TOKENS_KEY: &str = "tokenizer.ggml.tokens";

/// Conventional sentence-end symbol.
pub const EOS_SYMBOL: &str = "</s>";
/// Conventional unknown-word symbol.
pub const UNK_SYMBOL: &str = "<unk>";

/// Word list mapping labels to surface forms.
///
/// The vocabulary is informational: it lets tools turn words into labels.
/// The reserved labels used for scoring are configured separately and are
/// never looked up here.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocab {
    /// Words, indexed by label.
    pub tokens: Vec<String>,
    /// Reverse mapping from word to label.
    pub token_to_id: HashMap<String, u32>,
}

impl Vocab {
    /// Build a vocabulary from a word list. Duplicate words are rejected.
    pub fn new(tokens: Vec<String>) -> Result<Vocab> {
        let mut token_to_id = HashMap::with_capacity(tokens.len());
        for (id, tok) in tokens.iter().enumerate() {
            if token_to_id.insert(tok.clone(), id as u32).is_some() {
                return Err(ModelError::VocabError(format!(
                    "duplicate word {:?} at label {}",
                    tok, id
                )));
            }
        }
        Ok(Vocab {
            tokens,
            token_to_id,
        })
    }

    /// Read the optional word list from GGUF metadata.
    pub fn from_gguf(metadata: &GgufMetadata) -> Result<Option<Vocab>> {
        if !metadata.contains(TOKENS_KEY) {
            return Ok(None);
        }
        Vocab::new(metadata.get_string_array(TOKENS_KEY)?).map(Some)
    }

    /// The word list as a GGUF metadata value.
    pub fn to_metadata(&self) -> GgufMetadataValue {
        GgufMetadataValue::Array(
            self.tokens
                .iter()
                .map(|t| GgufMetadataValue::String(t.clone()))
                .collect(),
        )
    }

    pub fn id_of(&self, word: &str) -> Option<u32> {
        self.token_to_id.get(word).copied()
    }

    pub fn word_of(&self, id: u32) -> Option<&str> {
        self.tokens.get(id as usize).map(String::as_str)
    }

    /// Map words to labels, falling back to `<unk>` when the vocabulary has it.
    pub fn encode<'a>(&self, words: impl IntoIterator<Item = &'a str>) -> Result<Vec<u32>> {
        let unk = self.id_of(UNK_SYMBOL);
        words
            .into_iter()
            .map(|w| {
                self.id_of(w)
                    .or(unk)
                    .ok_or_else(|| ModelError::VocabError(format!("unknown word {:?}", w)))
            })
            .collect()
    }

    /// Number of words in the vocabulary.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Returns true if the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
