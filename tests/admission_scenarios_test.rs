use chrono::Utc;
use doc_ingest::app::IngestCoordinator;
use doc_ingest::domain::{Document, DocumentRequest};
use doc_ingest::error::IngestError;
use doc_ingest::rate_gate::RateGate;
use doc_ingest::storage::InMemoryDocumentStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn document(doc_id: impl Into<String>) -> Document {
    let doc_id: String = doc_id.into();
    let request: DocumentRequest = serde_json::from_value(json!({ "doc_id": doc_id })).unwrap();
    request.into_document(Utc::now())
}

fn coordinator(
    limit: usize,
    window: Duration,
) -> (Arc<IngestCoordinator<InMemoryDocumentStore>>, InMemoryDocumentStore) {
    let store = InMemoryDocumentStore::new();
    let gate = Arc::new(RateGate::new(limit, window).unwrap());
    let coordinator = Arc::new(IngestCoordinator::new(gate, Arc::new(store.clone())));
    (coordinator, store)
}

#[tokio::test(start_paused = true)]
async fn burst_of_five_with_limit_three_spills_into_next_window() {
    let (coordinator, store) = coordinator(3, Duration::from_secs(1));
    let start = Instant::now();

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .submit(document(format!("doc-{i}")))
                    .await
                    .unwrap();
                start.elapsed()
            })
        })
        .collect();

    let mut finished = Vec::new();
    for handle in handles {
        finished.push(handle.await.unwrap());
    }
    finished.sort();

    assert!(finished[..3].iter().all(|d| *d < Duration::from_millis(10)));
    assert!(finished[3..]
        .iter()
        .all(|d| *d >= Duration::from_millis(1000) && *d < Duration::from_millis(1010)));
    assert_eq!(store.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn sustained_load_never_exceeds_limit_per_window() {
    let limit = 4;
    let window = Duration::from_millis(200);
    let (coordinator, store) = coordinator(limit, window);
    let start = Instant::now();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                // Stagger arrivals across several windows.
                tokio::time::sleep(Duration::from_millis(i * 15)).await;
                coordinator
                    .submit(document(format!("doc-{i}")))
                    .await
                    .unwrap();
                start.elapsed()
            })
        })
        .collect();

    let mut finished = Vec::new();
    for handle in handles {
        finished.push(handle.await.unwrap());
    }
    finished.sort();
    assert_eq!(store.len(), 20);

    // Any span of one window length holds at most 2 * limit admissions, the
    // documented worst case across a reset boundary.
    for (i, first) in finished.iter().enumerate() {
        let within = finished[i..]
            .iter()
            .take_while(|t| **t - *first < window)
            .count();
        assert!(within <= 2 * limit, "{within} admissions within {window:?} of {first:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn failed_save_retry_waits_for_the_next_window() {
    let (coordinator, store) = coordinator(1, Duration::from_secs(1));

    coordinator.submit(document("dup")).await.unwrap();
    assert!(store.get("dup").is_some());

    // Next window: the duplicate is admitted, then rejected by the store.
    tokio::time::advance(Duration::from_secs(1)).await;
    let result = coordinator.submit(document("dup")).await;
    assert!(matches!(result, Err(IngestError::Storage(_))));

    let start = Instant::now();
    coordinator.submit(document("other")).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(990));
}
