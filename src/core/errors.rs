use thiserror::Error;

#[derive(Error, Debug)]
pub enum WordToAnkiError {
    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Local store error: {0}")]
    Sqlite(Box<rusqlite::Error>),

    #[error("Reqwest error: {0}")]
    Reqwest(Box<reqwest::Error>),

    #[error("E-reader could not be found: {0}")]
    DeviceNotFound(String),

    #[error("E-reader unreachable: {0}")]
    DeviceUnreachable(String),

    #[error("Dictionary credential rejected: {0}")]
    InvalidCredential(String),

    #[error("Dictionary request failed: {0}")]
    DictionaryTransport(String),

    #[error("Unexpected response from {service}: {reason}")]
    MalformedResponse { service: &'static str, reason: String },

    #[error("Headword for '{word}' did not converge after {hops} lookups")]
    ResolutionLoop { word: String, hops: usize },

    #[error("AnkiConnect unreachable: {0}")]
    BackendUnreachable(String),

    #[error("Anki rejected the note for '{0}' as a duplicate")]
    DuplicateCard(String),

    #[error("AnkiConnect error: {0}")]
    Backend(String),

    #[error("Headword '{0}' already has a note in the local store")]
    DuplicateNote(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("WordToAnkiError: {0}")]
    Custom(String),
}

impl WordToAnkiError {
    /// Errors that make every following word pointless to attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WordToAnkiError::Io(_)
                | WordToAnkiError::Sqlite(_)
                | WordToAnkiError::DeviceNotFound(_)
                | WordToAnkiError::DeviceUnreachable(_)
                | WordToAnkiError::InvalidCredential(_)
                | WordToAnkiError::BackendUnreachable(_)
                | WordToAnkiError::DuplicateNote(_)
                | WordToAnkiError::Config(_)
        )
    }

    /// Which external dependency a fatal error points at, for the final message.
    pub fn dependency(&self) -> &'static str {
        match self {
            WordToAnkiError::DeviceNotFound(_) | WordToAnkiError::DeviceUnreachable(_) => {
                "e-reader"
            }
            WordToAnkiError::InvalidCredential(_)
            | WordToAnkiError::DictionaryTransport(_)
            | WordToAnkiError::ResolutionLoop { .. } => "dictionary service",
            WordToAnkiError::MalformedResponse { service, .. } => *service,
            WordToAnkiError::BackendUnreachable(_)
            | WordToAnkiError::DuplicateCard(_)
            | WordToAnkiError::Backend(_) => "Anki",
            WordToAnkiError::Sqlite(_) | WordToAnkiError::DuplicateNote(_) => "local store",
            WordToAnkiError::Config(_) => "configuration",
            WordToAnkiError::Io(_)
            | WordToAnkiError::Json(_)
            | WordToAnkiError::Reqwest(_)
            | WordToAnkiError::Custom(_) => "word-to-anki",
        }
    }
}

impl From<std::io::Error> for WordToAnkiError {
    fn from(error: std::io::Error) -> Self {
        WordToAnkiError::Io(Box::new(error))
    }
}

impl From<reqwest::Error> for WordToAnkiError {
    fn from(error: reqwest::Error) -> Self {
        WordToAnkiError::Reqwest(Box::new(error))
    }
}

impl From<rusqlite::Error> for WordToAnkiError {
    fn from(error: rusqlite::Error) -> Self {
        WordToAnkiError::Sqlite(Box::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(WordToAnkiError::InvalidCredential("bad key".into()).is_fatal());
        assert!(WordToAnkiError::BackendUnreachable("refused".into()).is_fatal());
        assert!(WordToAnkiError::DuplicateNote("run".into()).is_fatal());

        assert!(!WordToAnkiError::DuplicateCard("run".into()).is_fatal());
        assert!(!WordToAnkiError::DictionaryTransport("timeout".into()).is_fatal());
        assert!(!WordToAnkiError::ResolutionLoop { word: "x".into(), hops: 4 }.is_fatal());
    }

    #[test]
    fn test_dependency_names() {
        assert_eq!(WordToAnkiError::DeviceNotFound("".into()).dependency(), "e-reader");
        assert_eq!(WordToAnkiError::BackendUnreachable("".into()).dependency(), "Anki");
        assert_eq!(
            WordToAnkiError::InvalidCredential("".into()).dependency(),
            "dictionary service"
        );
    }
}
