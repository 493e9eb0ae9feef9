/*!
 * Order Store Contract
 * Query semantics every `OrderStore` must share; each check expects an
 * empty store
 */

use chrono::{DateTime, TimeZone, Utc};
use dose_kernel::orders::{Order, OrderStatus, OrderStore, StoreError};
use pretty_assertions::assert_eq;
use serde_json::json;

/// Whole seconds, so timestamps survive a database round trip unchanged
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

pub async fn insert_and_get(store: &dyn OrderStore) {
    let first = store.insert(Order::new("first", at(0))).await.unwrap();
    let second = store.insert(Order::new("second", at(1))).await.unwrap();

    assert!(second.id > first.id);
    assert_eq!(first.status, OrderStatus::Queued);
    assert_eq!(store.get(&first.order_id).await.unwrap(), Some(first));
    assert_eq!(store.get(&second.order_id).await.unwrap(), Some(second));
    assert_eq!(store.get("missing").await.unwrap(), None);
}

pub async fn update_round_trip(store: &dyn OrderStore) {
    let mut order = store.insert(Order::new("original", at(0))).await.unwrap();
    order.mark_precheck_passed(json!({"model_id": "m1", "compounds": []}), at(1));
    order.mark_processed(true, at(2));
    order.record_send_attempt(at(3));
    order.input = "tampered".to_string();
    store.update(&order).await.unwrap();

    let stored = store.get(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.input, "original");
    order.input = "original".to_string();
    assert_eq!(stored, order);

    let mut unknown = Order::new("{}", at(0));
    unknown.id = order.id + 1000;
    assert!(matches!(
        store.update(&unknown).await,
        Err(StoreError::NotFound(_))
    ));
}

pub async fn unchecked_selection(store: &dyn OrderStore) {
    let late = store.insert(Order::new("late", at(20))).await.unwrap();
    let early = store.insert(Order::new("early", at(0))).await.unwrap();

    let mut deferred = store.insert(Order::new("deferred", at(5))).await.unwrap();
    deferred.mark_precheck_deferred(at(50));
    let mut passed = store.insert(Order::new("passed", at(6))).await.unwrap();
    passed.mark_precheck_passed(json!({}), at(7));
    let mut rejected = store.insert(Order::new("rejected", at(8))).await.unwrap();
    rejected.mark_precheck_rejected("two active substances", None, at(9));
    store
        .update_batch(&[deferred.clone(), passed, rejected])
        .await
        .unwrap();

    let ids = |orders: Vec<Order>| orders.iter().map(|o| o.id).collect::<Vec<_>>();
    assert_eq!(
        ids(store.fetch_unchecked(10, at(40)).await.unwrap()),
        vec![early.id, late.id]
    );
    assert_eq!(
        ids(store.fetch_unchecked(10, at(50)).await.unwrap()),
        vec![early.id, deferred.id, late.id]
    );
    assert_eq!(
        ids(store.fetch_unchecked(1, at(50)).await.unwrap()),
        vec![early.id]
    );
}

pub async fn purge_resets_interrupted_runs(store: &dyn OrderStore) {
    let mut running = store.insert(Order::new("running", at(0))).await.unwrap();
    running.mark_precheck_passed(json!({"model_id": "m1"}), at(1));
    let mut finished = store.insert(Order::new("finished", at(0))).await.unwrap();
    finished.mark_precheck_passed(json!({}), at(1));
    finished.mark_processed(true, at(2));
    let mut rejected = store.insert(Order::new("rejected", at(0))).await.unwrap();
    rejected.mark_precheck_rejected("no model found", None, at(1));
    store
        .update_batch(&[running.clone(), finished.clone(), rejected.clone()])
        .await
        .unwrap();

    assert_eq!(store.purge_interrupted().await.unwrap(), 1);

    let reset = store.get(&running.order_id).await.unwrap().unwrap();
    assert_eq!(reset.status, OrderStatus::Queued);
    assert!(!reset.precheck_passed);
    assert!(reset.precheck_result.is_none());
    assert!(reset.started_at.is_none());
    assert!(reset.last_prechecked_at.is_none());

    assert_eq!(store.get(&finished.order_id).await.unwrap(), Some(finished));
    assert_eq!(store.get(&rejected.order_id).await.unwrap(), Some(rejected));
    assert_eq!(store.purge_interrupted().await.unwrap(), 0);
}

pub async fn deliverable_selection(store: &dyn OrderStore) {
    let mut tried = store.insert(Order::new("{}", at(0))).await.unwrap();
    tried.mark_processed(true, at(1));
    tried.send_tries = 2;
    let mut fresh = store.insert(Order::new("{}", at(0))).await.unwrap();
    fresh.mark_processed(false, at(1));
    let mut waiting = store.insert(Order::new("{}", at(0))).await.unwrap();
    waiting.mark_processed(true, at(1));
    waiting.next_send_at = Some(at(500));
    let mut sent = store.insert(Order::new("{}", at(0))).await.unwrap();
    sent.mark_processed(true, at(1));
    sent.mark_sent(at(2));
    let failed = {
        let mut order = store.insert(Order::new("{}", at(0))).await.unwrap();
        order.mark_process_failed("script failed", at(1));
        order
    };
    store
        .update_batch(&[tried.clone(), fresh.clone(), waiting.clone(), sent, failed])
        .await
        .unwrap();

    let ids = |orders: Vec<Order>| orders.iter().map(|o| o.id).collect::<Vec<_>>();
    assert_eq!(
        ids(store.fetch_deliverable(10, at(100)).await.unwrap()),
        vec![fresh.id, tried.id]
    );
    assert_eq!(
        ids(store.fetch_deliverable(10, at(500)).await.unwrap()),
        vec![fresh.id, waiting.id, tried.id]
    );
    assert_eq!(
        ids(store.fetch_deliverable(1, at(500)).await.unwrap()),
        vec![fresh.id]
    );
}

pub async fn batch_is_all_or_nothing(store: &dyn OrderStore) {
    let original = store.insert(Order::new("{}", at(0))).await.unwrap();
    let mut changed = original.clone();
    changed.mark_precheck_deferred(at(5));
    let mut unknown = Order::new("{}", at(0));
    unknown.id = original.id + 1000;

    assert!(matches!(
        store.update_batch(&[changed.clone(), unknown]).await,
        Err(StoreError::NotFound(_))
    ));
    assert_eq!(store.get(&original.order_id).await.unwrap(), Some(original));

    store.update_batch(&[changed.clone()]).await.unwrap();
    assert_eq!(store.get(&changed.order_id).await.unwrap(), Some(changed));
}

pub async fn requeue_clears_downstream(store: &dyn OrderStore) {
    let mut order = store.insert(Order::new("payload", at(0))).await.unwrap();
    order.mark_precheck_rejected("bad input", Some(json!({"compounds": []})), at(1));
    order.mark_process_failed("script failed", at(2));
    order.record_send_attempt(at(3));
    store.update(&order).await.unwrap();

    let requeued = store.requeue(&order.order_id).await.unwrap();
    let mut expected = Order::new("payload", at(0));
    expected.id = order.id;
    expected.order_id = order.order_id.clone();
    assert_eq!(requeued, expected);
    assert_eq!(store.get(&order.order_id).await.unwrap(), Some(expected));

    assert!(matches!(
        store.requeue(&"missing".to_string()).await,
        Err(StoreError::NotFound(_))
    ));
}
