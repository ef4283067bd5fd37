//! Rate-gated document ingestion.
//!
//! Documents arrive over a single write endpoint and are persisted through a
//! [`DocumentSink`](app::DocumentSink). Every submission first passes the
//! [`RateGate`](rate_gate::RateGate), which admits at most N callers per fixed
//! window and parks the rest until the window rolls over.

pub mod app;
pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod logging;
pub mod observability;
pub mod rate_gate;
pub mod server;
pub mod storage;

pub use app::{DocumentSink, IngestCoordinator};
pub use error::{IngestError, Result, StorageError};
pub use rate_gate::{GateSnapshot, RateGate};
