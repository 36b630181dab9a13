use std::path::{
    Path,
    PathBuf,
};

use reqwest::blocking::Client;

use crate::core::{
    RawEntry,
    WordToAnkiError,
};

pub mod kobo;

pub use kobo::{
    find_mounted_kobo,
    KoboDatabase,
    NetworkKobo,
};

pub trait DeviceWordSource {
    /// Words in the order the device recorded them. An empty list is not an error.
    fn fetch_word_list(&self) -> Result<Vec<RawEntry>, WordToAnkiError>;
}

/// Picks the device adapter for a configured location: an existing path is a mounted
/// device, anything else is treated as a network address. Nothing configured means
/// looking for a mounted reader.
pub fn open_source(
    location: Option<&str>,
    client: Client,
    cache_dir: &Path,
) -> Result<Box<dyn DeviceWordSource>, WordToAnkiError> {
    match location.map(str::trim).filter(|l| !l.is_empty()) {
        Some(location) if Path::new(location).exists() => {
            Ok(Box::new(KoboDatabase::from_mount_or_file(Path::new(location))))
        }
        Some(address) => Ok(Box::new(NetworkKobo::new(client, address, cache_dir))),
        None => {
            let mount: PathBuf = find_mounted_kobo()?;
            log::info!("[Device] found mounted e-reader at {}", mount.display());
            Ok(Box::new(KoboDatabase::from_mount_or_file(&mount)))
        }
    }
}
