use std::sync::OnceLock;

use regex::Regex;

fn edge_punctuation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\p{P}\s]+|[\p{P}\s]+$").unwrap())
}

/// The single normalization applied to device words, dictionary headwords and stored stems.
/// Any drift between those three makes stored stems unreachable.
pub trait NormalizeStem {
    fn normalize_stem(&self) -> String;
}

// "Cats," -> "cats" AND " “Running”" -> "running"
impl NormalizeStem for str {
    fn normalize_stem(&self) -> String {
        edge_punctuation().replace_all(self, "").to_lowercase()
    }
}

impl NormalizeStem for String {
    fn normalize_stem(&self) -> String {
        self.as_str().normalize_stem()
    }
}

/// Dictionary headwords carry syllable breaks ("run*ning"); drop them before normalizing.
pub fn normalize_headword(headword: &str) -> String {
    headword.replace('*', "").normalize_stem()
}

/// Headword as it should read on a card: syllable breaks and edge punctuation gone, case kept.
pub fn display_headword(headword: &str) -> String {
    edge_punctuation().replace_all(&headword.replace('*', ""), "").into_owned()
}

pub fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
