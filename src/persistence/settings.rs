use std::{
    path::PathBuf,
    time::Duration,
};

use serde::{
    Deserialize,
    Serialize,
};

use super::{
    get_config_file_path,
    load_json_or_default,
};
use crate::core::WordToAnkiError;

pub const SETTINGS_FILE: &str = "settings.json";
pub const STORE_FILE: &str = "anki.sqlite";

pub const DICTIONARY_KEY_ENV: &str = "MERRIAM_WEBSTER_KEY";
pub const DEVICE_ENV: &str = "KOBO_ADDRESS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Device network address ("192.168.1.20:8080") or a mounted device path.
    /// Auto-detected from the mount table when absent.
    pub device: Option<String>,
    pub dictionary_key: Option<String>,
    pub anki_connect_url: String,
    pub deck_name: String,
    pub model_name: String,
    pub manage_anki: bool,
    pub ready_attempts: u32,
    pub ready_wait_secs: u64,
    pub http_timeout_secs: u64,
    pub store_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: None,
            dictionary_key: None,
            anki_connect_url: "http://localhost:8765".to_string(),
            deck_name: "Kobo_to_anki".to_string(),
            model_name: "Word".to_string(),
            manage_anki: true,
            ready_attempts: 10,
            ready_wait_secs: 2,
            http_timeout_secs: 30,
            store_path: None,
        }
    }
}

impl Settings {
    /// Settings file merged with environment overrides.
    pub fn load() -> Self {
        let mut settings = load_json_or_default::<Settings>(SETTINGS_FILE);
        settings.apply_env(|key| std::env::var(key).ok());
        settings
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(DICTIONARY_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.dictionary_key = Some(key);
        }
        if let Some(device) = lookup(DEVICE_ENV).filter(|d| !d.trim().is_empty()) {
            self.device = Some(device);
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.store_path.clone().unwrap_or_else(|| get_config_file_path(STORE_FILE))
    }

    pub fn dictionary_key(&self) -> Result<&str, WordToAnkiError> {
        self.dictionary_key.as_deref().map(str::trim).filter(|k| !k.is_empty()).ok_or_else(|| {
            WordToAnkiError::Config(format!(
                "no dictionary key; set {} or dictionary_key in {}",
                DICTIONARY_KEY_ENV, SETTINGS_FILE
            ))
        })
    }

    pub fn ready_wait(&self) -> Duration {
        Duration::from_secs(self.ready_wait_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }
}
