use std::time::Duration;

use reqwest::blocking::Client;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::json;

use super::types::{
    AudioAttachment,
    CardPayload,
    DeckTarget,
};
use crate::core::{
    http::send_with_retry,
    NoteId,
    WordToAnkiError,
};

const API_VERSION: u32 = 6;
const NOTE_TAG: &str = "word";

const MODEL_CSS: &str = ".card {\nfont-family: arial;\nfont-size: 20px;\ntext-align: center;\ncolor: black;\nbackground-color: white; }\n.back {  text-align: left;\n}";
const BACK_TEMPLATE: &str = "{{FrontSide}}  <hr id=answer>  <div class=back> {{Back}} </div>";

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub result: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn into_result(self, action: &str) -> Result<Option<T>, WordToAnkiError> {
        match self.error {
            Some(error) => Err(WordToAnkiError::Backend(format!("{}: {}", action, error))),
            None => Ok(self.result),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewNote<'a> {
    deck_name: &'a str,
    model_name: &'a str,
    fields: NoteFields<'a>,
    options: NoteOptions<'a>,
    tags: [&'a str; 1],
    audio: &'a [AudioAttachment],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct NoteFields<'a> {
    front: &'a str,
    back: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NoteOptions<'a> {
    allow_duplicate: bool,
    duplicate_scope: &'a str,
    duplicate_scope_options: DuplicateScopeOptions<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DuplicateScopeOptions<'a> {
    deck_name: &'a str,
    check_children: bool,
    check_all_models: bool,
}

#[derive(Clone)]
pub struct AnkiConnect {
    client: Client,
    url: String,
    backoff: Duration,
}

impl AnkiConnect {
    pub fn new(client: Client, url: &str) -> Self {
        Self { client, url: url.to_string(), backoff: Duration::from_secs(1) }
    }

    pub fn make_request<T: for<'de> Deserialize<'de>>(
        &self,
        action: &str,
        params: Option<serde_json::Value>,
    ) -> Result<ApiResponse<T>, WordToAnkiError> {
        self.request(action, params, true)
    }

    fn request<T: for<'de> Deserialize<'de>>(
        &self,
        action: &str,
        params: Option<serde_json::Value>,
        retry: bool,
    ) -> Result<ApiResponse<T>, WordToAnkiError> {
        let body = request_body(action, params);

        let sent = if retry {
            send_with_retry(|| self.client.post(&self.url).json(&body), self.backoff)
        } else {
            self.client.post(&self.url).json(&body).send()
        };

        let response = sent.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                WordToAnkiError::BackendUnreachable(format!("{}: {}", self.url, e))
            } else {
                WordToAnkiError::Backend(format!("{}: {}", action, e))
            }
        })?;

        response
            .json::<ApiResponse<T>>()
            .map_err(|e| WordToAnkiError::Backend(format!("{}: unreadable response: {}", action, e)))
    }

    /// Single attempt: callers polling for liveness bound their own retries.
    pub fn get_version(&self) -> Result<u32, WordToAnkiError> {
        let response: ApiResponse<u32> = self.request("version", None, false)?;
        Ok(response.into_result("version")?.unwrap_or_default())
    }

    pub fn get_deck_names(&self) -> Result<Vec<String>, WordToAnkiError> {
        let response: ApiResponse<Vec<String>> = self.make_request("deckNames", None)?;
        Ok(response.into_result("deckNames")?.unwrap_or_default())
    }

    pub fn get_model_names(&self) -> Result<Vec<String>, WordToAnkiError> {
        let response: ApiResponse<Vec<String>> = self.make_request("modelNames", None)?;
        Ok(response.into_result("modelNames")?.unwrap_or_default())
    }

    pub fn create_deck(&self, deck_name: &str) -> Result<(), WordToAnkiError> {
        let params = json!({ "deck": deck_name });
        let response: ApiResponse<serde_json::Value> = self.make_request("createDeck", Some(params))?;
        response.into_result("createDeck").map(|_| ())
    }

    pub fn create_model(&self, model_name: &str) -> Result<(), WordToAnkiError> {
        let params = json!({
            "modelName": model_name,
            "inOrderFields": ["Front", "Back"],
            "css": MODEL_CSS,
            "isCloze": false,
            "cardTemplates": [{
                "Name": "Card 1",
                "Front": "{{Front}}",
                "Back": BACK_TEMPLATE,
            }],
        });
        let response: ApiResponse<serde_json::Value> =
            self.make_request("createModel", Some(params))?;
        response.into_result("createModel").map(|_| ())
    }

    pub fn add_note(
        &self,
        target: &DeckTarget,
        payload: &CardPayload,
        audio: &[AudioAttachment],
    ) -> Result<NoteId, WordToAnkiError> {
        let note = NewNote {
            deck_name: &target.deck_name,
            model_name: &target.model_name,
            fields: NoteFields { front: &payload.front, back: &payload.back },
            options: NoteOptions {
                allow_duplicate: false,
                duplicate_scope: "deck",
                duplicate_scope_options: DuplicateScopeOptions {
                    deck_name: &target.deck_name,
                    check_children: false,
                    check_all_models: false,
                },
            },
            tags: [NOTE_TAG],
            audio,
        };
        let params = json!({ "note": note });

        let response: ApiResponse<i64> = self.make_request("addNote", Some(params))?;
        match response.error {
            Some(error) if is_duplicate_error(&error) => {
                Err(WordToAnkiError::DuplicateCard(payload.front.clone()))
            }
            Some(error) => Err(WordToAnkiError::Backend(format!("addNote: {}", error))),
            None => response
                .result
                .map(NoteId)
                .ok_or_else(|| WordToAnkiError::Backend("addNote: no note id returned".to_string())),
        }
    }

    pub fn sync(&self) -> Result<(), WordToAnkiError> {
        let response: ApiResponse<serde_json::Value> = self.make_request("sync", None)?;
        response.into_result("sync").map(|_| ())
    }

    /// Asks Anki to close itself, saving the collection on the way out.
    pub fn gui_exit_anki(&self) -> Result<(), WordToAnkiError> {
        let response: ApiResponse<serde_json::Value> = self.request("guiExitAnki", None, false)?;
        response.into_result("guiExitAnki").map(|_| ())
    }
}

fn request_body(action: &str, params: Option<serde_json::Value>) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert("action".to_string(), serde_json::Value::String(action.to_string()));
    body.insert("version".to_string(), serde_json::Value::Number(API_VERSION.into()));

    if let Some(params) = params {
        body.insert("params".to_string(), params);
    }
    serde_json::Value::Object(body)
}

fn is_duplicate_error(error: &str) -> bool {
    error.to_lowercase().contains("duplicate")
}
