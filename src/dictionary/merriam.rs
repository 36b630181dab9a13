//! Merriam-Webster Collegiate dictionary client.

use std::time::Duration;

use reqwest::{
    blocking::Client,
    StatusCode,
    Url,
};
use serde::Deserialize;

use super::{
    DictionaryService,
    Lookup,
    RawSense,
};
use crate::core::{
    http::send_with_retry,
    WordToAnkiError,
};

pub const COLLEGIATE_URL: &str = "https://www.dictionaryapi.com/api/v3/references/collegiate/json";
pub const AUDIO_BASE_URL: &str = "https://media.merriam-webster.com/audio/prons/en/us/mp3";

const INVALID_KEY_BODY: &str = "Invalid API key";
const SERVICE: &str = "Merriam-Webster";

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CollegiateResponse {
    Entries(Vec<Entry>),
    // An unknown word comes back as a list of spelling suggestions
    Suggestions(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    meta: Meta,
    #[serde(default)]
    hwi: HeadwordInfo,
    #[serde(default)]
    fl: Option<String>,
    #[serde(default)]
    shortdef: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Meta {
    #[serde(default)]
    stems: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HeadwordInfo {
    #[serde(default)]
    hw: String,
    #[serde(default)]
    prs: Vec<Pronunciation>,
}

#[derive(Debug, Deserialize)]
struct Pronunciation {
    #[serde(default)]
    sound: Option<Sound>,
}

#[derive(Debug, Deserialize)]
struct Sound {
    audio: String,
}

pub struct MerriamWebster {
    client: Client,
    base_url: String,
    key: String,
    backoff: Duration,
}

impl MerriamWebster {
    pub fn new(client: Client, key: &str) -> Self {
        Self::with_base_url(client, key, COLLEGIATE_URL)
    }

    pub fn with_base_url(client: Client, key: &str, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            backoff: Duration::from_secs(1),
        }
    }

    fn word_url(&self, word: &str) -> Result<Url, WordToAnkiError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| WordToAnkiError::Config(format!("dictionary URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| WordToAnkiError::Config(format!("dictionary URL {}", self.base_url)))?
            .pop_if_empty()
            .push(word);
        url.query_pairs_mut().append_pair("key", &self.key);
        Ok(url)
    }
}

impl DictionaryService for MerriamWebster {
    fn lookup(&self, word: &str) -> Result<Lookup, WordToAnkiError> {
        let url = self.word_url(word)?;

        let resp = send_with_retry(|| self.client.get(url.clone()), self.backoff)
            .map_err(|e| WordToAnkiError::DictionaryTransport(format!("'{}': {}", word, e)))?;

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| WordToAnkiError::DictionaryTransport(format!("'{}': {}", word, e)))?;

        classify(word, status, &body)
    }

    fn audio_url(&self, audio_file_id: &str) -> Option<String> {
        audio_url(audio_file_id)
    }
}

/// Maps a Collegiate API answer to a lookup or to the error kind the caller acts on.
/// A rejected key is checked first: the API answers it with a plain-text 200.
pub fn classify(word: &str, status: StatusCode, body: &str) -> Result<Lookup, WordToAnkiError> {
    if body.trim_start().starts_with(INVALID_KEY_BODY)
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
    {
        return Err(WordToAnkiError::InvalidCredential(body.trim().to_string()));
    }
    if !status.is_success() {
        return Err(WordToAnkiError::DictionaryTransport(format!(
            "HTTP error {} looking up '{}'",
            status, word
        )));
    }

    parse_response(body)
}

pub fn parse_response(body: &str) -> Result<Lookup, WordToAnkiError> {
    let response: CollegiateResponse = serde_json::from_str(body).map_err(|e| {
        WordToAnkiError::MalformedResponse { service: SERVICE, reason: e.to_string() }
    })?;

    let entries = match response {
        CollegiateResponse::Entries(entries) if !entries.is_empty() => entries,
        CollegiateResponse::Entries(_) | CollegiateResponse::Suggestions(_) => {
            return Ok(Lookup::not_found());
        }
    };

    let headword = entries[0].hwi.hw.clone();
    let senses = entries
        .into_iter()
        .map(|entry| RawSense {
            stems: entry.meta.stems.into_iter().collect(),
            functional_label: entry.fl.filter(|fl| !fl.is_empty()),
            definitions: entry.shortdef,
            audio_file_id: entry.hwi.prs.into_iter().find_map(|p| p.sound).map(|s| s.audio),
        })
        .collect();

    Ok(Lookup { headword, senses })
}

/// Audio files live in a subdirectory derived from their name.
pub fn audio_url(audio_file_id: &str) -> Option<String> {
    let first = audio_file_id.chars().next()?;

    let subdirectory = if audio_file_id.starts_with("bix") {
        "bix".to_string()
    } else if audio_file_id.starts_with("gg") {
        "gg".to_string()
    } else if first.is_ascii_digit() || first.is_ascii_punctuation() {
        "number".to_string()
    } else {
        first.to_string()
    };

    Some(format!("{}/{}/{}.mp3", AUDIO_BASE_URL, subdirectory, audio_file_id))
}
