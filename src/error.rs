use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Admission cancelled while waiting for capacity")]
    Cancelled,

    #[error("No admission slot within {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by a persistence sink.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Document {0} already exists")]
    Duplicate(String),

    #[error("Database error: {message}")]
    Database { message: String },
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Database {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
