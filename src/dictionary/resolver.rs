use std::collections::{
    BTreeMap,
    BTreeSet,
};

use super::{
    DictionaryService,
    Lookup,
};
use crate::{
    core::{
        utils::{
            display_headword,
            normalize_headword,
            NormalizeStem,
        },
        NoteId,
        ResolvedWord,
        SenseEntry,
        WordToAnkiError,
    },
    persistence::store::Store,
};

/// Lookups allowed before a word whose headword keeps moving is given up on.
pub const MAX_RESOLUTION_HOPS: usize = 4;

pub struct Resolver<'a> {
    dictionary: &'a dyn DictionaryService,
}

impl<'a> Resolver<'a> {
    pub fn new(dictionary: &'a dyn DictionaryService) -> Self {
        Self { dictionary }
    }

    /// Resolves a raw device word to a headword that still needs a card.
    /// `None` means there is nothing to do: already carded, empty, or no usable definition.
    pub fn resolve(
        &self,
        store: &Store,
        raw_text: &str,
    ) -> Result<Option<ResolvedWord>, WordToAnkiError> {
        let word = raw_text.normalize_stem();
        if word.is_empty() {
            log::debug!("[Dict] skipping empty entry {:?}", raw_text);
            return Ok(None);
        }

        if let Some(note_id) = store.is_stem_known(&word)? {
            log::debug!("[Dict] '{}' already carded as note {}", word, note_id);
            return Ok(None);
        }

        let mut query = word.clone();
        let mut queried = BTreeSet::new();

        for hop in 1..=MAX_RESOLUTION_HOPS {
            queried.insert(query.clone());

            let lookup = self.dictionary.lookup(&query)?;
            if lookup.is_not_found() {
                log::info!("[Dict] no dictionary entry for '{}'", query);
                return Ok(None);
            }

            let headword = normalize_headword(&lookup.headword);
            if headword.is_empty() {
                return Err(WordToAnkiError::MalformedResponse {
                    service: "dictionary",
                    reason: format!("empty headword for '{}'", query),
                });
            }

            if let Some(note_id) = self.known_headword(store, &headword)? {
                log::debug!("[Dict] '{}' resolves to carded '{}' (note {})", word, headword, note_id);
                return Ok(None);
            }

            if headword == query {
                return Ok(self.aggregate(&word, headword, lookup));
            }

            if queried.contains(&headword) {
                return Err(WordToAnkiError::ResolutionLoop { word, hops: hop });
            }

            log::debug!("[Dict] '{}' is an inflection of '{}'", query, headword);
            query = headword;
        }

        Err(WordToAnkiError::ResolutionLoop { word, hops: MAX_RESOLUTION_HOPS })
    }

    fn known_headword(
        &self,
        store: &Store,
        headword: &str,
    ) -> Result<Option<NoteId>, WordToAnkiError> {
        match store.is_stem_known(headword)? {
            Some(note_id) => Ok(Some(note_id)),
            None => store.headword_note(headword),
        }
    }

    /// Keeps the senses that list the looked-up form among their stems. Homographs that
    /// share the headword but not the form are dropped.
    fn aggregate(&self, word: &str, headword: String, lookup: Lookup) -> Option<ResolvedWord> {
        let display_headword = display_headword(&lookup.headword);
        let lists = |key: &str| {
            lookup.senses.iter().any(|sense| {
                sense.functional_label.is_some()
                    && sense.stems.iter().any(|stem| stem.normalize_stem() == key)
            })
        };
        // Forms the dictionary only lists under the headword still count
        let key = if lists(word) { word.to_string() } else { headword.clone() };

        let mut senses = BTreeMap::new();
        let mut stems = BTreeSet::new();

        for (idx, sense) in lookup.senses.into_iter().enumerate() {
            let Some(functional_label) = sense.functional_label else {
                continue;
            };
            let sense_stems: BTreeSet<String> = sense
                .stems
                .iter()
                .map(|stem| stem.normalize_stem())
                .filter(|stem| !stem.is_empty())
                .collect();
            if !sense_stems.contains(&key) {
                continue;
            }

            let audio_url = sense.audio_file_id.as_deref().and_then(|id| self.dictionary.audio_url(id));
            stems.extend(sense_stems);
            senses.insert(
                idx,
                SenseEntry { functional_label, definitions: sense.definitions, audio_url },
            );
        }

        if senses.is_empty() {
            log::info!("[Dict] no usable definition for '{}'", word);
            return None;
        }

        Some(ResolvedWord { headword, display_headword, senses, stems })
    }
}
