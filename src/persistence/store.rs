//! Local record of which headwords already have an Anki note and which stems lead to them.

use std::{
    collections::BTreeSet,
    fs,
    path::Path,
};

use chrono::{
    DateTime,
    SecondsFormat,
    Utc,
};
use rusqlite::{
    params,
    Connection,
    ErrorCode,
    OptionalExtension,
};

use crate::core::{
    NoteId,
    WordToAnkiError,
};

const NOTES_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS "Notes" (
    "IdNotes"   INTEGER,
    "Id"        INTEGER,
    "Word"      TEXT UNIQUE,
    "Book"      TEXT,
    "DateAdded" TEXT,
    PRIMARY KEY("IdNotes" AUTOINCREMENT)
);
"#;

const WORDS_TABLE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS "Words" (
    "IdWords"  INTEGER,
    "HeadWord" TEXT,
    "Stem"     TEXT,
    PRIMARY KEY("IdWords" AUTOINCREMENT)
);
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub notes: u64,
    pub stems: u64,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, WordToAnkiError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        log::debug!("[Store] opened {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, WordToAnkiError> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn ensure_schema(&self) -> Result<(), WordToAnkiError> {
        self.conn.execute_batch(NOTES_TABLE_SCHEMA)?;
        self.conn.execute_batch(WORDS_TABLE_SCHEMA)?;
        Ok(())
    }

    /// Note id of a headword that `stem` belongs to, if a card was created for it.
    pub fn is_stem_known(&self, stem: &str) -> Result<Option<NoteId>, WordToAnkiError> {
        let id = self
            .conn
            .query_row(
                r#"
                SELECT Notes.Id
                FROM Words LEFT JOIN Notes ON Words.HeadWord = Notes.Word
                WHERE Words.Stem = ?1 AND Notes.Id IS NOT NULL
                LIMIT 1
                "#,
                params![stem],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(id.map(NoteId))
    }

    pub fn headword_note(&self, headword: &str) -> Result<Option<NoteId>, WordToAnkiError> {
        let id = self
            .conn
            .query_row(
                "SELECT Id FROM Notes WHERE Word = ?1 AND Id IS NOT NULL",
                params![headword],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(id.map(NoteId))
    }

    pub fn record_note(
        &self,
        headword: &str,
        note_id: NoteId,
        source: &str,
        created_at: DateTime<Utc>,
    ) -> Result<(), WordToAnkiError> {
        insert_note(&self.conn, headword, note_id, source, created_at)
    }

    pub fn record_stems(
        &self,
        headword: &str,
        stems: &BTreeSet<String>,
    ) -> Result<(), WordToAnkiError> {
        insert_stems(&self.conn, headword, stems)
    }

    /// Records a created card: the note and all of its stems land together or not at all.
    pub fn record_card(
        &mut self,
        headword: &str,
        note_id: NoteId,
        source: &str,
        created_at: DateTime<Utc>,
        stems: &BTreeSet<String>,
    ) -> Result<(), WordToAnkiError> {
        let tx = self.conn.transaction()?;
        insert_note(&tx, headword, note_id, source, created_at)?;
        insert_stems(&tx, headword, stems)?;
        tx.commit()?;
        log::debug!("[Store] recorded '{}' (note {}, {} stems)", headword, note_id, stems.len());
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats, WordToAnkiError> {
        let notes: i64 = self.conn.query_row("SELECT COUNT(*) FROM Notes", [], |row| row.get(0))?;
        let stems: i64 = self.conn.query_row("SELECT COUNT(*) FROM Words", [], |row| row.get(0))?;
        Ok(StoreStats { notes: notes as u64, stems: stems as u64 })
    }
}

fn insert_note(
    conn: &Connection,
    headword: &str,
    note_id: NoteId,
    source: &str,
    created_at: DateTime<Utc>,
) -> Result<(), WordToAnkiError> {
    let result = conn.execute(
        "INSERT INTO Notes (Id, Word, Book, DateAdded) VALUES (?1, ?2, ?3, ?4)",
        params![
            note_id.0,
            headword,
            source,
            created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(WordToAnkiError::DuplicateNote(headword.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

fn insert_stems(
    conn: &Connection,
    headword: &str,
    stems: &BTreeSet<String>,
) -> Result<(), WordToAnkiError> {
    let mut stmt = conn.prepare_cached("INSERT INTO Words (HeadWord, Stem) VALUES (?1, ?2)")?;
    for stem in stems {
        stmt.execute(params![headword, stem])?;
    }
    Ok(())
}
