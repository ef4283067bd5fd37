use super::{Description, Document, Product};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Body of a create-document call, using the field names clients already send.
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentRequest {
    pub doc_id: String,
    #[serde(default)]
    pub doc_status: Option<String>,
    #[serde(default)]
    pub doc_type: Option<String>,
    #[serde(default, rename = "importRequest")]
    pub import_request: bool,
    #[serde(default)]
    pub owner_inn: Option<String>,
    #[serde(default)]
    pub participant_inn: Option<String>,
    #[serde(default)]
    pub producer_inn: Option<String>,
    #[serde(default)]
    pub production_date: Option<String>,
    #[serde(default)]
    pub production_type: Option<String>,
    #[serde(default)]
    pub reg_date: Option<String>,
    #[serde(default)]
    pub reg_number: Option<String>,
    #[serde(default)]
    pub description: Option<DescriptionRequest>,
    #[serde(default)]
    pub products: Vec<ProductRequest>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionRequest {
    #[serde(default)]
    pub description_id: Option<i64>,
    #[serde(default)]
    pub participant_inn: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductRequest {
    #[serde(default, rename = "productId")]
    pub product_id: Option<i64>,
    #[serde(default)]
    pub certificate_document: Option<String>,
    #[serde(default)]
    pub certificate_document_date: Option<String>,
    #[serde(default)]
    pub certificate_document_number: Option<String>,
    #[serde(default)]
    pub owner_inn: Option<String>,
    #[serde(default)]
    pub producer_inn: Option<String>,
    #[serde(default)]
    pub production_date: Option<String>,
    #[serde(default)]
    pub tnved_code: Option<String>,
    #[serde(default)]
    pub uit_code: Option<String>,
    #[serde(default)]
    pub uitu_code: Option<String>,
}

impl DocumentRequest {
    /// Map the request onto a storable document. Ids sent for the nested
    /// description and products are dropped; the store assigns its own.
    pub fn into_document(self, received_at: DateTime<Utc>) -> Document {
        Document {
            doc_id: self.doc_id,
            doc_status: self.doc_status,
            doc_type: self.doc_type,
            import_request: self.import_request,
            owner_inn: self.owner_inn,
            participant_inn: self.participant_inn,
            producer_inn: self.producer_inn,
            production_date: self.production_date,
            production_type: self.production_type,
            reg_date: self.reg_date,
            reg_number: self.reg_number,
            description: self.description.map(DescriptionRequest::into_description),
            products: self
                .products
                .into_iter()
                .map(ProductRequest::into_product)
                .collect(),
            received_at,
        }
    }
}

impl DescriptionRequest {
    fn into_description(self) -> Description {
        Description {
            description_id: None,
            participant_inn: self.participant_inn,
        }
    }
}

impl ProductRequest {
    fn into_product(self) -> Product {
        Product {
            product_id: None,
            certificate_document: self.certificate_document,
            certificate_document_date: self.certificate_document_date,
            certificate_document_number: self.certificate_document_number,
            owner_inn: self.owner_inn,
            producer_inn: self.producer_inn,
            production_date: self.production_date,
            tnved_code: self.tnved_code,
            uit_code: self.uit_code,
            uitu_code: self.uitu_code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn maps_request_fields_onto_document() {
        let body = json!({
            "doc_id": "doc-1",
            "doc_status": "NEW",
            "doc_type": "LP_INTRODUCE_GOODS",
            "importRequest": true,
            "owner_inn": "7700000001",
            "participant_inn": "7700000002",
            "producer_inn": "7700000003",
            "production_date": "2020-01-23",
            "production_type": "OWN_PRODUCTION",
            "reg_date": "2020-01-23",
            "reg_number": "42",
            "description": { "descriptionId": 99, "participantInn": "7700000002" },
            "products": [{
                "productId": 5,
                "certificate_document": "CONFORMITY_CERTIFICATE",
                "owner_inn": "7700000001",
                "tnved_code": "6401100000",
                "uit_code": "0104650117240026"
            }]
        });

        let request: DocumentRequest = serde_json::from_value(body).unwrap();
        let received_at = Utc::now();
        let doc = request.into_document(received_at);

        assert_eq!(doc.doc_id, "doc-1");
        assert!(doc.import_request);
        assert_eq!(doc.reg_number.as_deref(), Some("42"));
        assert_eq!(doc.received_at, received_at);

        let description = doc.description.unwrap();
        assert_eq!(description.participant_inn.as_deref(), Some("7700000002"));
        assert_eq!(description.description_id, None);

        assert_eq!(doc.products.len(), 1);
        let product = &doc.products[0];
        assert_eq!(product.product_id, None);
        assert_eq!(product.tnved_code.as_deref(), Some("6401100000"));
        assert_eq!(product.uitu_code, None);
    }

    #[test]
    fn only_doc_id_is_required() {
        let request: DocumentRequest = serde_json::from_value(json!({ "doc_id": "d" })).unwrap();
        let doc = request.into_document(Utc::now());
        assert!(doc.description.is_none());
        assert!(doc.products.is_empty());
        assert!(!doc.import_request);

        assert!(serde_json::from_value::<DocumentRequest>(json!({ "doc_type": "x" })).is_err());
    }
}
