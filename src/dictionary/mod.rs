use std::collections::BTreeSet;

use crate::core::WordToAnkiError;

pub mod merriam;
pub mod resolver;

pub use resolver::{
    Resolver,
    MAX_RESOLUTION_HOPS,
};

/// One dictionary entry as returned by the lookup service.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawSense {
    pub stems: BTreeSet<String>,
    pub functional_label: Option<String>,
    pub definitions: Vec<String>,
    pub audio_file_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Lookup {
    pub headword: String,
    pub senses: Vec<RawSense>, // Empty when the word is not in the dictionary
}

impl Lookup {
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn is_not_found(&self) -> bool {
        self.senses.is_empty()
    }
}

pub trait DictionaryService {
    /// `InvalidCredential` for a rejected key, `DictionaryTransport` for network failures.
    fn lookup(&self, word: &str) -> Result<Lookup, WordToAnkiError>;

    /// Playable URL for an audio id carried by a sense.
    fn audio_url(&self, audio_file_id: &str) -> Option<String>;
}
