pub mod ingest_coordinator;
pub mod ports;

pub use ingest_coordinator::IngestCoordinator;
pub use ports::DocumentSink;
