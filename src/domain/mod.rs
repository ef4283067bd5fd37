//! Document shapes stored by the persistence sinks.
//!
//! The gate never looks inside a document; only the sinks and the transport do.

mod request;

pub use request::{DescriptionRequest, DocumentRequest, ProductRequest};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub doc_status: Option<String>,
    pub doc_type: Option<String>,
    pub import_request: bool,
    pub owner_inn: Option<String>,
    pub participant_inn: Option<String>,
    pub producer_inn: Option<String>,
    pub production_date: Option<String>,
    pub production_type: Option<String>,
    pub reg_date: Option<String>,
    pub reg_number: Option<String>,
    pub description: Option<Description>,
    pub products: Vec<Product>,
    pub received_at: DateTime<Utc>,
}

/// One-to-one with its document. `description_id` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Description {
    pub description_id: Option<i64>,
    pub participant_inn: Option<String>,
}

/// One-to-many with its document. `product_id` is assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: Option<i64>,
    pub certificate_document: Option<String>,
    pub certificate_document_date: Option<String>,
    pub certificate_document_number: Option<String>,
    pub owner_inn: Option<String>,
    pub producer_inn: Option<String>,
    pub production_date: Option<String>,
    pub tnved_code: Option<String>,
    pub uit_code: Option<String>,
    pub uitu_code: Option<String>,
}

#[cfg(test)]
impl Document {
    /// A document carrying only its id.
    pub fn with_id(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            doc_status: None,
            doc_type: None,
            import_request: false,
            owner_inn: None,
            participant_inn: None,
            producer_inn: None,
            production_date: None,
            production_type: None,
            reg_date: None,
            reg_number: None,
            description: None,
            products: Vec::new(),
            received_at: Utc::now(),
        }
    }
}
