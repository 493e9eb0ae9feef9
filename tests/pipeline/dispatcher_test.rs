/*!
 * Result Dispatcher Tests
 * Delivery bookkeeping, backoff and terminal states
 */

use crate::common::*;
use chrono::Duration as ChronoDuration;
use dose_kernel::config::DispatchConfig;
use dose_kernel::core::types::now;
use dose_kernel::orders::{MemoryOrderStore, Order, OrderStatus, OrderStore};
use dose_kernel::ResultDispatcher;
use pretty_assertions::assert_eq;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const PDF_BASE64: &str = "JVBERi0xLjQ=";

fn config() -> DispatchConfig {
    DispatchConfig {
        interval: Duration::from_millis(20),
        batch_size: 10,
        max_send_tries: 3,
        retry_backoff: Duration::from_secs(60),
    }
}

async fn processed_order(store: &MemoryOrderStore, artifact: Option<&str>) -> Order {
    let mut order = store.insert(Order::new(PATIENT_INPUT, now())).await.unwrap();
    order.mark_precheck_passed(serde_json::json!({}), now());
    order.mark_processed(true, now());
    store.update(&order).await.unwrap();
    if let Some(artifact) = artifact {
        store.store_artifact(&order.order_id, artifact).unwrap();
    }
    store.get(&order.order_id).await.unwrap().unwrap()
}

#[tokio::test]
async fn test_successful_upload_marks_sent() {
    let store = MemoryOrderStore::new();
    let sink = Arc::new(RecordingSink::default());
    let order = processed_order(&store, Some(PDF_BASE64)).await;

    let dispatcher = ResultDispatcher::new(Arc::new(store.clone()), sink.clone(), config());
    let report = dispatcher.dispatch_once(now()).await.unwrap();
    assert_eq!(report.sent, 1);

    let stored = store.get(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Sent);
    assert_eq!(stored.send_tries, 1);
    assert!(stored.sent_at.is_some());
    assert!(stored.send_error.is_none());
    assert_eq!(stored.result.as_deref(), Some(PDF_BASE64));

    let uploads = sink.uploads.lock();
    assert_eq!(uploads[0].0, order.order_id);
    assert_eq!(uploads[0].1, b"%PDF-1.4");
}

#[tokio::test]
async fn test_failed_upload_keeps_processed() {
    let store = MemoryOrderStore::new();
    let sink = Arc::new(RecordingSink::failing());
    let order = processed_order(&store, Some(PDF_BASE64)).await;

    let dispatcher = ResultDispatcher::new(Arc::new(store.clone()), sink, config());
    let at = now();
    let report = dispatcher.dispatch_once(at).await.unwrap();
    assert_eq!(report.failed, 1);

    let stored = store.get(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Processed);
    assert_eq!(stored.send_tries, 1);
    assert!(stored.sent_at.is_none());
    assert_eq!(stored.last_send_attempt_at, Some(at));
    assert!(stored.send_error.unwrap().contains("503"));
    assert_eq!(stored.next_send_at, Some(at + ChronoDuration::seconds(60)));
}

#[tokio::test]
async fn test_backoff_defers_next_attempt() {
    let store = MemoryOrderStore::new();
    let sink = Arc::new(RecordingSink::failing());
    processed_order(&store, Some(PDF_BASE64)).await;

    let dispatcher = ResultDispatcher::new(Arc::new(store.clone()), sink.clone(), config());
    let at = now();
    dispatcher.dispatch_once(at).await.unwrap();

    let early = dispatcher
        .dispatch_once(at + ChronoDuration::seconds(30))
        .await
        .unwrap();
    assert_eq!(early.total(), 0);

    let due = dispatcher
        .dispatch_once(at + ChronoDuration::seconds(61))
        .await
        .unwrap();
    assert_eq!(due.failed, 1);
    assert_eq!(sink.uploads.lock().len(), 2);
}

#[tokio::test]
async fn test_exhausted_tries_park_order() {
    let store = MemoryOrderStore::new();
    let sink = Arc::new(RecordingSink::failing());
    let order = processed_order(&store, Some(PDF_BASE64)).await;

    let dispatcher = ResultDispatcher::new(Arc::new(store.clone()), sink.clone(), config());
    let mut at = now();
    for _ in 0..3 {
        dispatcher.dispatch_once(at).await.unwrap();
        at = at + ChronoDuration::hours(2);
    }

    let stored = store.get(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::SendFailed);
    assert_eq!(stored.send_tries, 3);
    assert!(stored.sent_at.is_none());

    assert_eq!(dispatcher.dispatch_once(at).await.unwrap().total(), 0);
    assert_eq!(sink.uploads.lock().len(), 3);
}

#[tokio::test]
async fn test_missing_or_corrupt_artifact_is_terminal() {
    let store = MemoryOrderStore::new();
    let sink = Arc::new(RecordingSink::default());
    let missing = processed_order(&store, None).await;
    let corrupt = processed_order(&store, Some("%%%not base64%%%")).await;

    let dispatcher = ResultDispatcher::new(Arc::new(store.clone()), sink.clone(), config());
    let report = dispatcher.dispatch_once(now()).await.unwrap();
    assert_eq!(report.invalid, 2);
    assert!(sink.uploads.lock().is_empty());

    for order_id in [&missing.order_id, &corrupt.order_id] {
        let stored = store.get(order_id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Error);
        assert_eq!(stored.send_tries, 0);
        assert!(stored.process_error.is_some());
    }
    assert_eq!(dispatcher.dispatch_once(now()).await.unwrap().total(), 0);
}

#[tokio::test]
async fn test_fewest_tries_first() {
    let store = MemoryOrderStore::new();
    let sink = Arc::new(RecordingSink::default());

    let mut retried = processed_order(&store, Some(PDF_BASE64)).await;
    retried.record_send_attempt(now());
    retried.record_send_attempt(now());
    store.update(&retried).await.unwrap();
    let fresh = processed_order(&store, Some(PDF_BASE64)).await;

    let dispatcher = ResultDispatcher::new(
        Arc::new(store.clone()),
        sink.clone(),
        DispatchConfig {
            batch_size: 1,
            ..config()
        },
    );
    dispatcher.dispatch_once(now()).await.unwrap();

    assert_eq!(sink.uploads.lock()[0].0, fresh.order_id);
}

#[tokio::test]
async fn test_background_loop_delivers_after_recovery() {
    let store = MemoryOrderStore::new();
    let sink = Arc::new(RecordingSink::failing());
    let order = processed_order(&store, Some(PDF_BASE64)).await;

    let task = ResultDispatcher::new(
        Arc::new(store.clone()),
        sink.clone(),
        DispatchConfig {
            retry_backoff: Duration::ZERO,
            max_send_tries: 100,
            ..config()
        },
    )
    .spawn();

    let uploads = sink.clone();
    assert!(wait_for(Duration::from_secs(5), || uploads.uploads.lock().len() >= 1).await);
    sink.failing.store(false, Ordering::SeqCst);

    let watched = store.clone();
    assert!(
        wait_for(Duration::from_secs(5), || watched.all()[0].status == OrderStatus::Sent).await
    );
    task.shutdown().await;

    let stored = store.get(&order.order_id).await.unwrap().unwrap();
    assert!(stored.send_tries >= 2);
    assert!(stored.send_error.is_none());
}
