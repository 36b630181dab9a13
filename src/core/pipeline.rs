use std::time::{
    Duration,
    Instant,
};

use super::{
    NoteId,
    RawEntry,
    WordToAnkiError,
};
use crate::{
    anki::{
        card,
        lifecycle::{
            AppLifecycle,
            AppStatus,
        },
        wait_awake,
        FlashcardBackend,
    },
    device::DeviceWordSource,
    dictionary::{
        DictionaryService,
        Resolver,
    },
    persistence::store::Store,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub attempts: u32,
    pub wait: Duration,
}

impl Default for Readiness {
    fn default() -> Self {
        Self { attempts: 10, wait: Duration::from_secs(2) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedNote {
    pub headword: String,
    pub note_id: NoteId,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedWord {
    pub word: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub added: Vec<AddedNote>,
    pub skipped: usize, // Already carded, empty, or nothing usable in the dictionary
    pub failed: Vec<FailedWord>,
    pub synced: bool,
}

impl RunReport {
    /// Every word that was attempted ended in an error.
    pub fn all_failed(&self) -> bool {
        !self.failed.is_empty() && self.added.is_empty() && self.skipped == 0
    }
}

pub struct Pipeline<'a> {
    pub store: &'a mut Store,
    pub device: &'a dyn DeviceWordSource,
    pub dictionary: &'a dyn DictionaryService,
    pub backend: &'a dyn FlashcardBackend,
    pub lifecycle: &'a mut dyn AppLifecycle,
    pub readiness: Readiness,
}

impl<'a> Pipeline<'a> {
    /// One full run. Per-word errors land in the report; only fatal errors are returned.
    /// The flashcard application is shut down on every exit path.
    pub fn run(&mut self) -> Result<RunReport, WordToAnkiError> {
        let start = Instant::now();
        let result = self.run_steps();

        if let Err(e) = self.lifecycle.shutdown() {
            log::warn!("[Pipeline] failed to close the flashcard application: {}", e);
        }

        if let Ok(report) = &result {
            log::info!(
                "[Pipeline] {} added, {} skipped, {} failed ({:.1}s)",
                report.added.len(),
                report.skipped,
                report.failed.len(),
                start.elapsed().as_secs_f32()
            );
        }
        result
    }

    fn run_steps(&mut self) -> Result<RunReport, WordToAnkiError> {
        self.store.ensure_schema()?;
        self.ensure_backend_ready()?;

        let entries = self.device.fetch_word_list()?;
        let mut report = RunReport::default();
        if entries.is_empty() {
            log::info!("[Pipeline] device word list is empty");
            return Ok(report);
        }

        for entry in &entries {
            self.process(entry, &mut report)?;
        }

        // Cards added so far are already persisted; a failed sync only loses the upload
        match self.backend.trigger_sync() {
            Ok(()) => report.synced = true,
            Err(e) => log::warn!("[Pipeline] sync failed, cards stay local until the next sync: {}", e),
        }
        Ok(report)
    }

    fn ensure_backend_ready(&mut self) -> Result<(), WordToAnkiError> {
        if !self.backend.is_reachable() {
            match self.lifecycle.ensure_running()? {
                AppStatus::Unreachable => {
                    return Err(WordToAnkiError::BackendUnreachable(
                        "AnkiConnect is not answering and Anki could not be started".to_string(),
                    ));
                }
                AppStatus::Started | AppStatus::AlreadyRunning => {
                    if !wait_awake(self.backend, self.readiness.wait, self.readiness.attempts) {
                        return Err(WordToAnkiError::BackendUnreachable(format!(
                            "AnkiConnect did not answer after {} attempts",
                            self.readiness.attempts
                        )));
                    }
                }
            }
        }

        self.backend.ensure_provisioned()
    }

    fn process(&mut self, entry: &RawEntry, report: &mut RunReport) -> Result<(), WordToAnkiError> {
        match self.add_word(entry) {
            Ok(Some(added)) => {
                log::info!("[Pipeline] added '{}' (note {})", added.headword, added.note_id);
                report.added.push(added);
            }
            Ok(None) => report.skipped += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::warn!("[Pipeline] skipping '{}': {}", entry.text, e);
                report.failed.push(FailedWord { word: entry.text.clone(), reason: e.to_string() });
            }
        }
        Ok(())
    }

    fn add_word(&mut self, entry: &RawEntry) -> Result<Option<AddedNote>, WordToAnkiError> {
        let Some(resolved) = Resolver::new(self.dictionary).resolve(&*self.store, &entry.text)? else {
            return Ok(None);
        };

        let card = card::build(&resolved);
        let note_id = self.backend.submit_card(&card.payload, &card.audio)?;

        // Only after Anki confirmed the note
        let source = entry.display_source();
        self.store.record_card(&resolved.headword, note_id, &source, entry.created_at, &resolved.stems)?;

        Ok(Some(AddedNote { headword: resolved.headword, note_id, source }))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::{
            Cell,
            RefCell,
        },
        collections::{
            BTreeSet,
            HashMap,
        },
    };

    use chrono::{
        TimeZone,
        Utc,
    };

    use super::*;
    use crate::{
        anki::{
            lifecycle::ExternallyManaged,
            types::{
                AudioAttachment,
                CardPayload,
            },
        },
        dictionary::{
            Lookup,
            RawSense,
        },
    };

    struct FakeDevice(Vec<RawEntry>);

    impl DeviceWordSource for FakeDevice {
        fn fetch_word_list(&self) -> Result<Vec<RawEntry>, WordToAnkiError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct FakeDictionary {
        entries: HashMap<String, Lookup>,
        reject_key: bool,
        calls: RefCell<Vec<String>>,
    }

    impl FakeDictionary {
        fn with(mut self, query: &str, headword: &str, stems: &[&str], label: &str, defs: &[&str]) -> Self {
            let sense = RawSense {
                stems: stems.iter().map(|s| s.to_string()).collect(),
                functional_label: Some(label.to_string()),
                definitions: defs.iter().map(|s| s.to_string()).collect(),
                audio_file_id: None,
            };
            self.entries
                .insert(query.to_string(), Lookup { headword: headword.to_string(), senses: vec![sense] });
            self
        }
    }

    impl DictionaryService for FakeDictionary {
        fn lookup(&self, word: &str) -> Result<Lookup, WordToAnkiError> {
            self.calls.borrow_mut().push(word.to_string());
            if self.reject_key {
                return Err(WordToAnkiError::InvalidCredential("Invalid API key.".to_string()));
            }
            Ok(self.entries.get(word).cloned().unwrap_or_default())
        }

        fn audio_url(&self, _audio_file_id: &str) -> Option<String> {
            None
        }
    }

    struct FakeBackend {
        reachable_after: Cell<u32>,
        duplicates: BTreeSet<String>,
        submitted: RefCell<Vec<CardPayload>>,
        polls: Cell<u32>,
        syncs: Cell<u32>,
        fail_sync: bool,
        next_id: Cell<i64>,
    }

    impl FakeBackend {
        fn online() -> Self {
            Self {
                reachable_after: Cell::new(0),
                duplicates: BTreeSet::new(),
                submitted: RefCell::new(Vec::new()),
                polls: Cell::new(0),
                syncs: Cell::new(0),
                fail_sync: false,
                next_id: Cell::new(1000),
            }
        }
    }

    impl FlashcardBackend for FakeBackend {
        fn is_reachable(&self) -> bool {
            self.polls.set(self.polls.get() + 1);
            match self.reachable_after.get() {
                0 => true,
                n => {
                    self.reachable_after.set(n - 1);
                    false
                }
            }
        }

        fn ensure_provisioned(&self) -> Result<(), WordToAnkiError> {
            Ok(())
        }

        fn submit_card(
            &self,
            payload: &CardPayload,
            _audio: &[AudioAttachment],
        ) -> Result<NoteId, WordToAnkiError> {
            if self.duplicates.contains(&payload.front) {
                return Err(WordToAnkiError::DuplicateCard(payload.front.clone()));
            }
            self.submitted.borrow_mut().push(payload.clone());
            let id = self.next_id.get() + 1;
            self.next_id.set(id);
            Ok(NoteId(id))
        }

        fn trigger_sync(&self) -> Result<(), WordToAnkiError> {
            self.syncs.set(self.syncs.get() + 1);
            if self.fail_sync {
                return Err(WordToAnkiError::Backend("sync: auth not configured".to_string()));
            }
            Ok(())
        }
    }

    struct FakeLifecycle {
        status: AppStatus,
        starts: u32,
        shutdowns: u32,
    }

    impl FakeLifecycle {
        fn new(status: AppStatus) -> Self {
            Self { status, starts: 0, shutdowns: 0 }
        }
    }

    impl AppLifecycle for FakeLifecycle {
        fn ensure_running(&mut self) -> Result<AppStatus, WordToAnkiError> {
            self.starts += 1;
            Ok(self.status)
        }

        fn shutdown(&mut self) -> Result<(), WordToAnkiError> {
            self.shutdowns += 1;
            Ok(())
        }
    }

    fn entry(text: &str) -> RawEntry {
        RawEntry {
            text: text.to_string(),
            source_location: "file:///mnt/onboard/book.epub".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 20, 15, 0).unwrap(),
        }
    }

    fn store() -> Store {
        Store::open_in_memory().unwrap()
    }

    fn dictionary() -> FakeDictionary {
        FakeDictionary::default()
            .with("running", "run", &["run", "running", "ran"], "verb", &["to move fast"])
            .with("run", "run", &["run", "running", "ran"], "verb", &["to move fast"])
            .with("cats", "cat", &["cat", "cats"], "noun", &["a small domesticated feline"])
            .with("cat", "cat", &["cat", "cats"], "noun", &["a small domesticated feline"])
    }

    fn run(
        store: &mut Store,
        device: &FakeDevice,
        dictionary: &FakeDictionary,
        backend: &FakeBackend,
        lifecycle: &mut dyn AppLifecycle,
    ) -> Result<RunReport, WordToAnkiError> {
        Pipeline {
            store,
            device,
            dictionary,
            backend,
            lifecycle,
            readiness: Readiness { attempts: 5, wait: Duration::ZERO },
        }
        .run()
    }

    #[test]
    fn test_inflected_word_creates_headword_note() {
        let mut store = store();
        let dictionary = dictionary();
        let backend = FakeBackend::online();
        let mut lifecycle = FakeLifecycle::new(AppStatus::AlreadyRunning);

        let report =
            run(&mut store, &FakeDevice(vec![entry("running")]), &dictionary, &backend, &mut lifecycle)
                .unwrap();

        assert_eq!(report.added.len(), 1);
        let added = &report.added[0];
        assert_eq!(added.headword, "run");
        assert_eq!(added.source, "book.epub");
        assert_eq!(store.headword_note("run").unwrap(), Some(added.note_id));
        assert_eq!(store.stats().unwrap().stems, 3);
        for stem in ["run", "running", "ran"] {
            assert_eq!(store.is_stem_known(stem).unwrap(), Some(added.note_id));
        }

        let submitted = backend.submitted.borrow();
        assert_eq!(submitted[0].front, "run");
        assert!(submitted[0].back.contains("verb"));
        assert!(submitted[0].back.contains("To move fast"));
        assert!(submitted[0].back.contains("ran, run, running"));

        assert_eq!(backend.syncs.get(), 1);
        assert!(report.synced);
        assert_eq!(lifecycle.starts, 0);
        assert_eq!(lifecycle.shutdowns, 1);
    }

    #[test]
    fn test_card_front_keeps_dictionary_case() {
        let mut store = store();
        let dictionary =
            dictionary().with("paris", "Paris", &["Paris"], "noun", &["capital of France"]);
        let backend = FakeBackend::online();
        let mut lifecycle = FakeLifecycle::new(AppStatus::AlreadyRunning);

        let report =
            run(&mut store, &FakeDevice(vec![entry("Paris")]), &dictionary, &backend, &mut lifecycle)
                .unwrap();

        let fronts: Vec<String> = backend.submitted.borrow().iter().map(|p| p.front.clone()).collect();
        assert_eq!(fronts, vec!["Paris"]);
        assert_eq!(report.added[0].headword, "paris");
        assert_eq!(store.headword_note("paris").unwrap(), Some(report.added[0].note_id));
    }

    #[test]
    fn test_known_stem_on_later_run_needs_no_lookup() {
        let mut store = store();
        let dictionary = dictionary();
        let backend = FakeBackend::online();
        let mut lifecycle = FakeLifecycle::new(AppStatus::AlreadyRunning);

        run(&mut store, &FakeDevice(vec![entry("running")]), &dictionary, &backend, &mut lifecycle)
            .unwrap();
        let lookups = dictionary.calls.borrow().len();

        let report =
            run(&mut store, &FakeDevice(vec![entry("ran")]), &dictionary, &backend, &mut lifecycle)
                .unwrap();

        assert!(report.added.is_empty());
        assert_eq!(report.skipped, 1);
        assert_eq!(dictionary.calls.borrow().len(), lookups);
        assert_eq!(store.stats().unwrap().notes, 1);
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let mut store = store();
        let dictionary = dictionary();
        let backend = FakeBackend::online();
        let mut lifecycle = FakeLifecycle::new(AppStatus::AlreadyRunning);
        let device = FakeDevice(vec![entry("running"), entry("cats"), entry("unknownish")]);

        let first = run(&mut store, &device, &dictionary, &backend, &mut lifecycle).unwrap();
        let second = run(&mut store, &device, &dictionary, &backend, &mut lifecycle).unwrap();

        assert_eq!(first.added.len(), 2);
        assert!(second.added.is_empty());
        assert_eq!(store.stats().unwrap().notes, 2);
        assert_eq!(backend.submitted.borrow().len(), 2);
    }

    #[test]
    fn test_normalized_variants_share_one_card() {
        let mut store = store();
        let dictionary = dictionary();
        let backend = FakeBackend::online();
        let mut lifecycle = FakeLifecycle::new(AppStatus::AlreadyRunning);
        let device = FakeDevice(vec![entry("Cats,"), entry("cats"), entry(" cats ")]);

        let report = run(&mut store, &device, &dictionary, &backend, &mut lifecycle).unwrap();

        assert_eq!(report.added.len(), 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(*dictionary.calls.borrow(), vec!["cats", "cat"]);
    }

    #[test]
    fn test_duplicate_rejection_only_skips_that_word() {
        let mut store = store();
        let dictionary = dictionary();
        let mut backend = FakeBackend::online();
        backend.duplicates.insert("run".to_string());
        let mut lifecycle = FakeLifecycle::new(AppStatus::AlreadyRunning);
        let device = FakeDevice(vec![entry("running"), entry("cats")]);

        let report = run(&mut store, &device, &dictionary, &backend, &mut lifecycle).unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].word, "running");
        assert_eq!(report.added.len(), 1);
        assert!(!report.all_failed());
        // Nothing recorded for the rejected card
        assert_eq!(store.is_stem_known("running").unwrap(), None);
        assert_eq!(store.headword_note("run").unwrap(), None);
        assert_eq!(backend.syncs.get(), 1);
    }

    #[test]
    fn test_invalid_credential_aborts_run() {
        let mut store = store();
        let dictionary = FakeDictionary { reject_key: true, ..dictionary() };
        let backend = FakeBackend::online();
        let mut lifecycle = FakeLifecycle::new(AppStatus::AlreadyRunning);
        let device = FakeDevice(vec![entry("running"), entry("cats")]);

        let err = run(&mut store, &device, &dictionary, &backend, &mut lifecycle).unwrap_err();

        assert!(matches!(err, WordToAnkiError::InvalidCredential(_)));
        assert_eq!(dictionary.calls.borrow().len(), 1);
        assert_eq!(backend.syncs.get(), 0);
        assert_eq!(lifecycle.shutdowns, 1);
    }

    #[test]
    fn test_backend_started_and_polled() {
        let mut store = store();
        let dictionary = dictionary();
        let backend = FakeBackend::online();
        backend.reachable_after.set(2);
        let mut lifecycle = FakeLifecycle::new(AppStatus::Started);

        let report =
            run(&mut store, &FakeDevice(vec![entry("cats")]), &dictionary, &backend, &mut lifecycle)
                .unwrap();

        assert_eq!(lifecycle.starts, 1);
        assert_eq!(report.added.len(), 1);
    }

    #[test]
    fn test_externally_managed_backend_is_still_polled() {
        let mut store = store();
        let dictionary = dictionary();
        let backend = FakeBackend::online();
        backend.reachable_after.set(1);
        let mut lifecycle = ExternallyManaged;

        let report =
            run(&mut store, &FakeDevice(vec![entry("cats")]), &dictionary, &backend, &mut lifecycle)
                .unwrap();

        assert_eq!(backend.polls.get(), 2);
        assert_eq!(report.added.len(), 1);
    }

    #[test]
    fn test_backend_that_never_answers_is_fatal() {
        let mut store = store();
        let dictionary = dictionary();
        let backend = FakeBackend::online();
        backend.reachable_after.set(u32::MAX);
        let mut lifecycle = FakeLifecycle::new(AppStatus::Started);

        let err =
            run(&mut store, &FakeDevice(vec![entry("cats")]), &dictionary, &backend, &mut lifecycle)
                .unwrap_err();

        assert!(matches!(err, WordToAnkiError::BackendUnreachable(_)));
        assert!(dictionary.calls.borrow().is_empty());

        let mut lifecycle = FakeLifecycle::new(AppStatus::Unreachable);
        let err =
            run(&mut store, &FakeDevice(vec![entry("cats")]), &dictionary, &backend, &mut lifecycle)
                .unwrap_err();
        assert_eq!(err.dependency(), "Anki");
    }

    #[test]
    fn test_empty_word_list_ends_after_provisioning() {
        let mut store = store();
        let dictionary = dictionary();
        let backend = FakeBackend::online();
        let mut lifecycle = FakeLifecycle::new(AppStatus::AlreadyRunning);

        let report =
            run(&mut store, &FakeDevice(vec![]), &dictionary, &backend, &mut lifecycle).unwrap();

        assert_eq!(report, RunReport::default());
        assert_eq!(backend.syncs.get(), 0);
        assert_eq!(lifecycle.shutdowns, 1);
    }

    #[test]
    fn test_failed_sync_keeps_the_report() {
        let mut store = store();
        let dictionary = dictionary();
        let backend = FakeBackend { fail_sync: true, ..FakeBackend::online() };
        let mut lifecycle = FakeLifecycle::new(AppStatus::AlreadyRunning);

        let report =
            run(&mut store, &FakeDevice(vec![entry("cats")]), &dictionary, &backend, &mut lifecycle)
                .unwrap();

        assert_eq!(report.added.len(), 1);
        assert!(!report.synced);
        assert_eq!(backend.syncs.get(), 1);
        assert_eq!(store.headword_note("cat").unwrap(), Some(report.added[0].note_id));
        assert_eq!(lifecycle.shutdowns, 1);
    }

    #[test]
    fn test_all_failed() {
        let mut store = store();
        let dictionary = dictionary();
        let mut backend = FakeBackend::online();
        backend.duplicates.insert("cat".to_string());
        let mut lifecycle = FakeLifecycle::new(AppStatus::AlreadyRunning);

        let report =
            run(&mut store, &FakeDevice(vec![entry("cats")]), &dictionary, &backend, &mut lifecycle)
                .unwrap();

        assert!(report.all_failed());
        assert!(report.synced);
    }
}
