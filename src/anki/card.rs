use std::fmt::Write;

use super::types::{
    AudioAttachment,
    BuiltCard,
    CardPayload,
    BACK_FIELD,
};
use crate::core::{
    utils::capitalize_first,
    ResolvedWord,
};

/// Turns a resolved word into card content. Every call builds a fresh card.
pub fn build(resolved: &ResolvedWord) -> BuiltCard {
    let mut back = String::new();
    let mut audio = Vec::new();

    for sense in resolved.senses.values() {
        let filename = sense.audio_url.as_deref().and_then(audio_filename);

        match (&sense.audio_url, filename) {
            (Some(url), Some(filename)) => {
                let _ = write!(
                    back,
                    "<p><strong>{} [sound:{}]</strong></p>",
                    sense.functional_label, filename
                );
                audio.push(AudioAttachment {
                    url: url.clone(),
                    filename,
                    fields: vec![BACK_FIELD.to_string()],
                });
            }
            _ => {
                let _ = write!(back, "<p><strong>{}</strong></p>", sense.functional_label);
            }
        }

        for definition in &sense.definitions {
            let _ = write!(back, "<p style='margin-left:5%'>{}</p>", capitalize_first(definition));
        }
    }

    // BTreeSet: already deduplicated and ordered
    let stems = resolved.stems.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    let _ = write!(back, "<p><strong>stems:&nbsp;</strong><em>{}</em></p>", stems);

    BuiltCard { payload: CardPayload { front: resolved.display_headword.clone(), back }, audio }
}

/// Last path segment of the audio URL, query and fragment excluded.
fn audio_filename(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().filter(|name| !name.is_empty()).map(str::to_string)
}
