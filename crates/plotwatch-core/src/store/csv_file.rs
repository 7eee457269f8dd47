use super::{write_atomically, ListingStore};
use crate::{ListingRecord, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Column names, in file order. Must match the serde names on [`ListingRecord`].
pub const HEADERS: [&str; 11] = [
    "Title",
    "Location",
    "Price at first find",
    "Date first found",
    "Date last updated",
    "Price last updated",
    "Distance (km)",
    "Active",
    "Link",
    "Latitude",
    "Longitude",
];

/// The listing set as one CSV file per source.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Vec<ListingRecord>> {
        if !self.path.exists() {
            info!("No listing file at {}, starting fresh", self.path.display());
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut records: Vec<ListingRecord> = Vec::new();
        for row in reader.deserialize() {
            records.push(row?);
        }
        Ok(records)
    }

    fn write(&self, records: &[ListingRecord]) -> Result<()> {
        write_atomically(&self.path, |file| {
            let mut writer = csv::Writer::from_writer(file);
            if records.is_empty() {
                writer.write_record(HEADERS)?;
            }
            for record in records {
                writer.serialize(record)?;
            }
            writer.flush()?;
            Ok(())
        })
    }
}

#[async_trait]
impl ListingStore for CsvStore {
    async fn load_all(&self) -> Result<Vec<ListingRecord>> {
        self.read()
    }

    async fn save_all(&self, records: &[ListingRecord]) -> Result<()> {
        self.write(records)?;
        info!("Saved {} listings to {}", records.len(), self.path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("CSV file {}", self.path.display())
    }
}
