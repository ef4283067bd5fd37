use crate::domain::Document;
use crate::error::StorageError;
use async_trait::async_trait;

/// Durable home for admitted documents, keyed by `doc_id`.
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Store one document. A second save with the same id fails with
    /// [`StorageError::Duplicate`].
    async fn save(&self, document: Document) -> Result<(), StorageError>;

    /// Short backend name used in logs and metrics.
    fn backend(&self) -> &'static str;
}
