use std::time::Duration;

use api::AnkiConnect;
use types::{
    AudioAttachment,
    CardPayload,
    DeckTarget,
};

use crate::core::{
    NoteId,
    WordToAnkiError,
};

pub mod api;
pub mod card;
pub mod lifecycle;
pub mod types;

pub trait FlashcardBackend {
    fn is_reachable(&self) -> bool;

    /// Creates the target deck and note type if they are missing.
    fn ensure_provisioned(&self) -> Result<(), WordToAnkiError>;

    /// `DuplicateCard` when the backend's own duplicate check rejects the note.
    fn submit_card(
        &self,
        payload: &CardPayload,
        audio: &[AudioAttachment],
    ) -> Result<NoteId, WordToAnkiError>;

    fn trigger_sync(&self) -> Result<(), WordToAnkiError>;
}

pub struct AnkiBackend {
    api: AnkiConnect,
    target: DeckTarget,
}

impl AnkiBackend {
    pub fn new(api: AnkiConnect, target: DeckTarget) -> Self {
        Self { api, target }
    }
}

impl FlashcardBackend for AnkiBackend {
    fn is_reachable(&self) -> bool {
        match self.api.get_version() {
            Ok(version) => {
                log::debug!("[Anki] AnkiConnect is online. Version: {}", version);
                true
            }
            Err(e) => {
                log::debug!("[Anki] AnkiConnect not reachable: {}", e);
                false
            }
        }
    }

    fn ensure_provisioned(&self) -> Result<(), WordToAnkiError> {
        let model_names = self.api.get_model_names()?;
        if !model_names.contains(&self.target.model_name) {
            log::info!("[Anki] creating note type '{}'", self.target.model_name);
            self.api.create_model(&self.target.model_name)?;
        }

        let deck_names = self.api.get_deck_names()?;
        if !deck_names.contains(&self.target.deck_name) {
            log::info!("[Anki] creating deck '{}'", self.target.deck_name);
            self.api.create_deck(&self.target.deck_name)?;
        }

        Ok(())
    }

    fn submit_card(
        &self,
        payload: &CardPayload,
        audio: &[AudioAttachment],
    ) -> Result<NoteId, WordToAnkiError> {
        self.api.add_note(&self.target, payload, audio)
    }

    fn trigger_sync(&self) -> Result<(), WordToAnkiError> {
        self.api.sync()
    }
}

/// Polls the backend until it answers, at most `max_attempts` times.
pub fn wait_awake(backend: &dyn FlashcardBackend, wait_time: Duration, max_attempts: u32) -> bool {
    for attempt in 1..=max_attempts {
        if backend.is_reachable() {
            return true;
        }
        log::info!(
            "[Anki] AnkiConnect attempt {} of {} failed. Retrying in {:?}...",
            attempt,
            max_attempts,
            wait_time
        );
        if attempt < max_attempts {
            std::thread::sleep(wait_time);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct WakesAfter {
        remaining: Cell<u32>,
        polls: Cell<u32>,
    }

    impl FlashcardBackend for WakesAfter {
        fn is_reachable(&self) -> bool {
            self.polls.set(self.polls.get() + 1);
            if self.remaining.get() == 0 {
                return true;
            }
            self.remaining.set(self.remaining.get() - 1);
            false
        }

        fn ensure_provisioned(&self) -> Result<(), WordToAnkiError> {
            Ok(())
        }

        fn submit_card(&self, _: &CardPayload, _: &[AudioAttachment]) -> Result<NoteId, WordToAnkiError> {
            Ok(NoteId(1))
        }

        fn trigger_sync(&self) -> Result<(), WordToAnkiError> {
            Ok(())
        }
    }

    #[test]
    fn test_wait_awake_is_bounded() {
        let backend = WakesAfter { remaining: Cell::new(2), polls: Cell::new(0) };
        assert!(wait_awake(&backend, Duration::ZERO, 5));
        assert_eq!(backend.polls.get(), 3);

        let backend = WakesAfter { remaining: Cell::new(100), polls: Cell::new(0) };
        assert!(!wait_awake(&backend, Duration::ZERO, 4));
        assert_eq!(backend.polls.get(), 4);
    }
}
