//! Persistence adapters for the listing set.

mod csv_file;
pub mod migrations;
mod sqlite;

pub use csv_file::{CsvStore, HEADERS};
pub use sqlite::SqliteStore;

use crate::{ListingRecord, Result};
use async_trait::async_trait;
use std::path::Path;
use tempfile::NamedTempFile;

/// Whole-set load and save. Every field of [`ListingRecord`] must survive a
/// save followed by a load.
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<ListingRecord>>;

    /// Replaces the stored set. Either the new set is fully written or the
    /// old one is left as it was.
    async fn save_all(&self, records: &[ListingRecord]) -> Result<()>;

    fn describe(&self) -> String;
}

/// Picks the adapter from the file extension: SQLite for `.db`, `.sqlite`
/// and `.sqlite3`, CSV for anything else.
pub async fn open_store(path: impl AsRef<Path>) -> Result<Box<dyn ListingStore>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);

    match extension.as_deref() {
        Some("db") | Some("sqlite") | Some("sqlite3") => Ok(Box::new(SqliteStore::open(path).await?)),
        _ => Ok(Box::new(CsvStore::new(path))),
    }
}

/// Writes through a temporary file in the target directory, then renames it
/// over `path`, so readers never see a half-written file.
pub(crate) fn write_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> Result<()>,
{
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut file = NamedTempFile::new_in(parent)?;
    write(&mut file)?;
    file.as_file().sync_all()?;
    file.persist(path)?;
    Ok(())
}
