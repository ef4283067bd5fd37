//! Persistence sinks for admitted documents.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;

use crate::app::ports::DocumentSink;
use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;
use std::sync::Arc;
use tracing::info;

/// Build the sink selected in `config`.
pub fn open(config: &StorageConfig) -> Result<Arc<dyn DocumentSink>> {
    let sink: Arc<dyn DocumentSink> = match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory document store");
            Arc::new(InMemoryDocumentStore::new())
        }
        StorageBackend::Sqlite => {
            info!("Using SQLite document store at {}", config.path.display());
            Arc::new(SqliteDocumentStore::open(&config.path)?)
        }
    };
    Ok(sink)
}
