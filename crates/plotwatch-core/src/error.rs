use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlotwatchError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
    #[error("Failed to replace output file: {0}")]
    Persist(#[from] tempfile::PersistError),
    #[error("Scraping error: {0}")]
    Scraping(String),
    #[error("Geocoding error: {0}")]
    Geocoding(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Run cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, PlotwatchError>;
