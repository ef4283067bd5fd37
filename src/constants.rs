/// Route accepting new documents.
pub const DOCUMENTS_ENDPOINT: &str = "/api/v3/lk/documents/create";

/// Body returned for an accepted document.
pub const DOCUMENT_CREATED: &str = "Document Created Successfully";

// Defaults used when neither the config file nor the environment set a value
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";
pub const DEFAULT_REQUEST_LIMIT: i64 = 10;
pub const DEFAULT_WINDOW: &str = "1 SECOND";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DB_PATH: &str = "data/documents.db";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_LOG_FILTER: &str = "doc_ingest=info,tower_http=info";

/// Floor for the `Retry-After` sent when a wait at the gate was cut short.
pub const MIN_RETRY_AFTER_SECS: u64 = 1;
