use crate::app::ports::DocumentSink;
use crate::domain::Document;
use crate::error::{IngestError, Result};
use crate::observability::metrics::SinkMetrics;
use crate::rate_gate::RateGate;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Waits for capacity at the gate, then hands the document to the sink.
///
/// A slot consumed by a submission whose save fails is not given back: the
/// failed write still counts against the window.
pub struct IngestCoordinator<S: DocumentSink + ?Sized> {
    gate: Arc<RateGate>,
    sink: Arc<S>,
}

impl<S: DocumentSink + ?Sized> IngestCoordinator<S> {
    pub fn new(gate: Arc<RateGate>, sink: Arc<S>) -> Self {
        Self { gate, sink }
    }

    pub fn gate(&self) -> &Arc<RateGate> {
        &self.gate
    }

    pub async fn submit(&self, document: Document) -> Result<()> {
        self.submit_until(document, std::future::pending()).await
    }

    pub async fn submit_cancellable(
        &self,
        document: Document,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.submit_until(document, async {
            cancel.cancelled().await;
            IngestError::Cancelled
        })
        .await
    }

    /// `interrupt` only applies while waiting at the gate; once admitted the
    /// save always runs to completion.
    pub async fn submit_until<F>(&self, document: Document, interrupt: F) -> Result<()>
    where
        F: Future<Output = IngestError>,
    {
        let span = info_span!(
            "submit",
            submission_id = %Uuid::new_v4(),
            doc_id = %document.doc_id
        );

        async move {
            self.gate.acquire_until(interrupt).await?;
            self.persist(document).await
        }
        .instrument(span)
        .await
    }

    async fn persist(&self, document: Document) -> Result<()> {
        let doc_id = document.doc_id.clone();
        match self.sink.save(document).await {
            Ok(()) => {
                SinkMetrics::record_saved(self.sink.backend());
                info!("Document {} is saved", doc_id);
                Ok(())
            }
            Err(e) => {
                SinkMetrics::record_failed(&e);
                warn!(backend = self.sink.backend(), "Failed to save document {}: {}", doc_id, e);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct RecordingSink {
        pub saved: Arc<tokio::sync::Mutex<Vec<Document>>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                saved: Arc::new(tokio::sync::Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl DocumentSink for RecordingSink {
        async fn save(&self, document: Document) -> std::result::Result<(), StorageError> {
            self.saved.lock().await.push(document);
            Ok(())
        }

        fn backend(&self) -> &'static str {
            "recording"
        }
    }

    struct FailingSink {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentSink for FailingSink {
        async fn save(&self, _document: Document) -> std::result::Result<(), StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StorageError::Database {
                message: "disk full".to_string(),
            })
        }

        fn backend(&self) -> &'static str {
            "failing"
        }
    }

    fn gate(limit: usize, window_ms: u64) -> Arc<RateGate> {
        Arc::new(RateGate::new(limit, Duration::from_millis(window_ms)).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn admitted_document_reaches_the_sink() {
        let sink = Arc::new(RecordingSink::new());
        let coordinator = IngestCoordinator::new(gate(2, 1000), sink.clone());

        coordinator.submit(Document::with_id("a")).await.unwrap();
        coordinator.submit(Document::with_id("b")).await.unwrap();

        let saved = sink.saved.lock().await;
        let ids: Vec<_> = saved.iter().map(|d| d.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(coordinator.gate().snapshot().count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_save_is_surfaced_and_keeps_its_slot() {
        let sink = Arc::new(FailingSink {
            calls: AtomicUsize::new(0),
        });
        let coordinator = IngestCoordinator::new(gate(1, 1000), sink.clone());

        let result = coordinator.submit(Document::with_id("a")).await;
        assert!(matches!(
            result,
            Err(IngestError::Storage(StorageError::Database { .. }))
        ));
        assert_eq!(coordinator.gate().snapshot().count, 1);

        // Retrying inside the same window still has to wait.
        let max_wait = Duration::from_millis(100);
        let retry = coordinator
            .submit_until(Document::with_id("a"), async move {
                tokio::time::sleep(max_wait).await;
                IngestError::TimedOut(max_wait)
            })
            .await;
        assert!(matches!(retry, Err(IngestError::TimedOut(_))));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_submission_never_reaches_the_sink() {
        let sink = Arc::new(RecordingSink::new());
        let coordinator = Arc::new(IngestCoordinator::new(gate(1, 1000), sink.clone()));
        coordinator.submit(Document::with_id("first")).await.unwrap();

        let token = CancellationToken::new();
        let pending = {
            let coordinator = coordinator.clone();
            let token = token.clone();
            tokio::spawn(async move {
                coordinator
                    .submit_cancellable(Document::with_id("second"), &token)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();

        assert!(matches!(pending.await.unwrap(), Err(IngestError::Cancelled)));
        assert_eq!(sink.saved.lock().await.len(), 1);
        let snap = coordinator.gate().snapshot();
        assert_eq!(snap.count, 1);
        assert_eq!(snap.waiting, 0);
    }
}
