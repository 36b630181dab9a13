use std::{
    collections::{
        BTreeMap,
        BTreeSet,
    },
    fmt,
};

use chrono::{
    DateTime,
    Utc,
};

const KOBO_MOUNT_PREFIX: &str = "/mnt/onboard/";

/// Note id handed out by Anki when a note is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteId(pub i64);

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of the device word list.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub text: String,
    pub source_location: String, // e.g. "file:///mnt/onboard/book.epub"
    pub created_at: DateTime<Utc>,
}

impl RawEntry {
    /// Source location relative to the device storage root.
    pub fn display_source(&self) -> String {
        let mut source = self.source_location.as_str();

        if let Some((scheme, rest)) = source.split_once("://") {
            if !scheme.is_empty() && scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
                source = rest;
            }
        }

        let source = source.strip_prefix(KOBO_MOUNT_PREFIX).unwrap_or(source);
        source.trim_start_matches('/').to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SenseEntry {
    pub functional_label: String,
    pub definitions: Vec<String>,
    pub audio_url: Option<String>,
}

/// A word resolved to its dictionary headword, ready to become a card.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWord {
    pub headword: String, // Normalized, the key in the local store
    pub display_headword: String, // As the dictionary spells it, e.g. "Paris"
    pub senses: BTreeMap<usize, SenseEntry>, // <(sense index in the lookup, sense)>
    pub stems: BTreeSet<String>,
}
