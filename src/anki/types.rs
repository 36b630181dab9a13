use serde::{
    Deserialize,
    Serialize,
};

/// Field the audio player tag and attachments go into.
pub const BACK_FIELD: &str = "Back";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardPayload {
    pub front: String,
    pub back: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioAttachment {
    pub url: String,
    pub filename: String,
    pub fields: Vec<String>,
}

/// A card ready for submission together with the audio Anki should download for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltCard {
    pub payload: CardPayload,
    pub audio: Vec<AudioAttachment>,
}

/// Where created notes go. Supplied once by provisioning, never per card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckTarget {
    pub deck_name: String,
    pub model_name: String,
}
