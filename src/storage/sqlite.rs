use crate::app::ports::DocumentSink;
use crate::domain::{Description, Document, Product};
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

const SCHEMA: &str = r#"
    PRAGMA journal_mode=WAL;
    PRAGMA foreign_keys=ON;
    CREATE TABLE IF NOT EXISTS documents (
        doc_id           TEXT PRIMARY KEY,
        doc_status       TEXT,
        doc_type         TEXT,
        import_request   INTEGER NOT NULL,
        owner_inn        TEXT,
        participant_inn  TEXT,
        producer_inn     TEXT,
        production_date  TEXT,
        production_type  TEXT,
        reg_date         TEXT,
        reg_number       TEXT,
        received_at      TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS descriptions (
        description_id   INTEGER PRIMARY KEY AUTOINCREMENT,
        doc_id           TEXT NOT NULL UNIQUE REFERENCES documents(doc_id),
        participant_inn  TEXT
    );
    CREATE TABLE IF NOT EXISTS products (
        product_id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        doc_id                       TEXT NOT NULL REFERENCES documents(doc_id),
        certificate_document         TEXT,
        certificate_document_date    TEXT,
        certificate_document_number  TEXT,
        owner_inn                    TEXT,
        producer_inn                 TEXT,
        production_date              TEXT,
        tnved_code                   TEXT,
        uit_code                     TEXT,
        uitu_code                    TEXT
    );
"#;

/// SQLite-backed store. One transaction per document; the description and
/// products land in their own tables keyed back to `doc_id`.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Database {
                message: format!("cannot create {}: {}", parent.display(), e),
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn count(&self) -> Result<usize, StorageError> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn get(&self, doc_id: &str) -> Result<Option<Document>, StorageError> {
        let conn = self.conn();

        let mut document = {
            let mut stmt = conn.prepare(
                "SELECT doc_id, doc_status, doc_type, import_request, owner_inn, participant_inn,
                        producer_inn, production_date, production_type, reg_date, reg_number, received_at
                 FROM documents WHERE doc_id = ?1",
            )?;
            let mut rows = stmt.query(params![doc_id])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            let received_at: String = row.get(11)?;
            Document {
                doc_id: row.get(0)?,
                doc_status: row.get(1)?,
                doc_type: row.get(2)?,
                import_request: row.get(3)?,
                owner_inn: row.get(4)?,
                participant_inn: row.get(5)?,
                producer_inn: row.get(6)?,
                production_date: row.get(7)?,
                production_type: row.get(8)?,
                reg_date: row.get(9)?,
                reg_number: row.get(10)?,
                description: None,
                products: Vec::new(),
                received_at: parse_timestamp(&received_at)?,
            }
        };

        {
            let mut stmt = conn.prepare(
                "SELECT description_id, participant_inn FROM descriptions WHERE doc_id = ?1",
            )?;
            let mut rows = stmt.query(params![doc_id])?;
            if let Some(row) = rows.next()? {
                document.description = Some(Description {
                    description_id: row.get(0)?,
                    participant_inn: row.get(1)?,
                });
            }
        }

        let mut stmt = conn.prepare(
            "SELECT product_id, certificate_document, certificate_document_date,
                    certificate_document_number, owner_inn, producer_inn, production_date,
                    tnved_code, uit_code, uitu_code
             FROM products WHERE doc_id = ?1 ORDER BY product_id",
        )?;
        let products = stmt.query_map(params![doc_id], |row| {
            Ok(Product {
                product_id: row.get(0)?,
                certificate_document: row.get(1)?,
                certificate_document_date: row.get(2)?,
                certificate_document_number: row.get(3)?,
                owner_inn: row.get(4)?,
                producer_inn: row.get(5)?,
                production_date: row.get(6)?,
                tnved_code: row.get(7)?,
                uit_code: row.get(8)?,
                uitu_code: row.get(9)?,
            })
        })?;
        for product in products {
            document.products.push(product?);
        }

        Ok(Some(document))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl DocumentSink for SqliteDocumentStore {
    async fn save(&self, document: Document) -> Result<(), StorageError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || insert_document(&mut store.conn(), &document))
            .await
            .map_err(|e| StorageError::Database {
                message: format!("storage task failed: {e}"),
            })?
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}

fn insert_document(conn: &mut Connection, doc: &Document) -> Result<(), StorageError> {
    let tx = conn.transaction()?;

    let inserted = tx.execute(
        "INSERT INTO documents (doc_id, doc_status, doc_type, import_request, owner_inn,
                                participant_inn, producer_inn, production_date, production_type,
                                reg_date, reg_number, received_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            doc.doc_id,
            doc.doc_status,
            doc.doc_type,
            doc.import_request,
            doc.owner_inn,
            doc.participant_inn,
            doc.producer_inn,
            doc.production_date,
            doc.production_type,
            doc.reg_date,
            doc.reg_number,
            doc.received_at.to_rfc3339(),
        ],
    );
    match inserted {
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
            return Err(StorageError::Duplicate(doc.doc_id.clone()));
        }
        Err(e) => return Err(e.into()),
        Ok(_) => {}
    }

    if let Some(description) = &doc.description {
        tx.execute(
            "INSERT INTO descriptions (doc_id, participant_inn) VALUES (?1, ?2)",
            params![doc.doc_id, description.participant_inn],
        )?;
    }

    for product in &doc.products {
        tx.execute(
            "INSERT INTO products (doc_id, certificate_document, certificate_document_date,
                                   certificate_document_number, owner_inn, producer_inn,
                                   production_date, tnved_code, uit_code, uitu_code)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                doc.doc_id,
                product.certificate_document,
                product.certificate_document_date,
                product.certificate_document_number,
                product.owner_inn,
                product.producer_inn,
                product.production_date,
                product.tnved_code,
                product.uit_code,
                product.uitu_code,
            ],
        )?;
    }

    tx.commit()?;
    debug!(
        products = doc.products.len(),
        "Stored document {} in SQLite", doc.doc_id
    );
    Ok(())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Database {
            message: format!("bad received_at '{raw}': {e}"),
        })
}
