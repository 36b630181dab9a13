use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};

use chrono::{
    DateTime,
    NaiveDateTime,
    Utc,
};
use reqwest::blocking::Client;
use rusqlite::{
    Connection,
    OpenFlags,
};

use super::DeviceWordSource;
use crate::core::{
    http::download_to_file,
    RawEntry,
    WordToAnkiError,
};

pub const KOBO_DB_RELATIVE: &str = ".kobo/KoboReader.sqlite";
const MOUNT_MARKER: &str = "KOBOeReader";
const MOUNTS_FILE: &str = "/proc/mounts";
const SNAPSHOT_FILE: &str = "KoboReader.sqlite";

/// Reads the word list out of a `KoboReader.sqlite` file.
#[derive(Debug, Clone)]
pub struct KoboDatabase {
    path: PathBuf,
}

impl KoboDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Accepts either the device mount point or the database file itself.
    pub fn from_mount_or_file(location: &Path) -> Self {
        if location.is_dir() {
            Self::new(location.join(KOBO_DB_RELATIVE))
        } else {
            Self::new(location)
        }
    }
}

impl DeviceWordSource for KoboDatabase {
    fn fetch_word_list(&self) -> Result<Vec<RawEntry>, WordToAnkiError> {
        if !self.path.is_file() {
            return Err(WordToAnkiError::DeviceNotFound(format!(
                "{} does not exist. Ensure the device is plugged in and mounted",
                self.path.display()
            )));
        }

        let unreadable =
            |e: rusqlite::Error| WordToAnkiError::DeviceUnreachable(format!("{}: {}", self.path.display(), e));

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(unreadable)?;

        let mut stmt = conn
            // Lookup order; rows without a timestamp go last
            .prepare(
                "SELECT Text, VolumeId, DateCreated FROM WordList
                 ORDER BY DateCreated IS NULL, DateCreated, rowid",
            )
            .map_err(unreadable)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(unreadable)?;

        let mut entries = Vec::new();
        for row in rows {
            let (text, volume_id, date_created) = row.map_err(unreadable)?;
            let created_at = date_created.as_deref().and_then(parse_kobo_timestamp).unwrap_or_else(|| {
                log::debug!("[Device] no usable timestamp for '{}', using now", text);
                Utc::now()
            });
            entries.push(RawEntry {
                text,
                source_location: volume_id.unwrap_or_default(),
                created_at,
            });
        }

        log::info!("[Device] {} words in the device word list", entries.len());
        Ok(entries)
    }
}

/// Copies the device database over the network before reading it.
pub struct NetworkKobo {
    client: Client,
    url: String,
    snapshot: PathBuf,
    backoff: Duration,
}

impl NetworkKobo {
    pub fn new(client: Client, address: &str, cache_dir: &Path) -> Self {
        Self {
            client,
            url: database_url(address),
            snapshot: cache_dir.join(SNAPSHOT_FILE),
            backoff: Duration::from_secs(2),
        }
    }
}

impl DeviceWordSource for NetworkKobo {
    fn fetch_word_list(&self) -> Result<Vec<RawEntry>, WordToAnkiError> {
        if let Some(parent) = self.snapshot.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = download_to_file(&self.client, &self.url, &self.snapshot, self.backoff)?;
        log::info!("[Device] copied {} bytes from {}", bytes, self.url);

        KoboDatabase::new(&self.snapshot).fetch_word_list()
    }
}

fn database_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    let base = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    if base.ends_with(".sqlite") {
        base
    } else {
        format!("{}/{}", base, KOBO_DB_RELATIVE)
    }
}

/// Mount point of a plugged-in Kobo, from the system mount table.
pub fn find_mounted_kobo() -> Result<PathBuf, WordToAnkiError> {
    let mounts = fs::read_to_string(MOUNTS_FILE).unwrap_or_default();
    find_kobo_mount(&mounts).ok_or_else(|| {
        WordToAnkiError::DeviceNotFound(
            "Kobo Reader can not be found. Ensure device is plugged in and mounted, or configure its address"
                .to_string(),
        )
    })
}

fn find_kobo_mount(mounts: &str) -> Option<PathBuf> {
    mounts
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(unescape_mount_path)
        .find(|target| target.contains(MOUNT_MARKER))
        .map(PathBuf::from)
}

// The mount table escapes whitespace as octal: "\040" is a space
fn unescape_mount_path(raw: &str) -> String {
    raw.replace("\\040", " ").replace("\\011", "\t").replace("\\134", "\\")
}

pub fn parse_kobo_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}
