use crate::app::ports::DocumentSink;
use crate::domain::Document;
use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// In-memory document store for development/testing
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    documents: Arc<Mutex<HashMap<String, Document>>>,
    // Shared identity sequence for descriptions and products
    last_id: Arc<AtomicI64>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, doc_id: &str) -> Option<Document> {
        self.documents().get(doc_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents().is_empty()
    }

    fn next_id(&self) -> i64 {
        self.last_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn documents(&self) -> MutexGuard<'_, HashMap<String, Document>> {
        self.documents.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DocumentSink for InMemoryDocumentStore {
    async fn save(&self, mut document: Document) -> Result<(), StorageError> {
        let mut documents = self.documents();
        match documents.entry(document.doc_id.clone()) {
            Entry::Occupied(_) => Err(StorageError::Duplicate(document.doc_id)),
            Entry::Vacant(slot) => {
                if let Some(description) = document.description.as_mut() {
                    description.description_id = Some(self.next_id());
                }
                for product in &mut document.products {
                    product.product_id = Some(self.next_id());
                }
                debug!("Stored document {} in memory", document.doc_id);
                slot.insert(document);
                Ok(())
            }
        }
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
