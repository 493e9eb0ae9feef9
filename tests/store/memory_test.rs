/*!
 * In-Memory Store Tests
 */

use super::contract::{self, at};
use dose_kernel::orders::{MemoryOrderStore, Order, OrderStore};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_insert_and_get() {
    contract::insert_and_get(&MemoryOrderStore::new()).await;
}

#[tokio::test]
async fn test_update_round_trip() {
    contract::update_round_trip(&MemoryOrderStore::new()).await;
}

#[tokio::test]
async fn test_unchecked_selection() {
    contract::unchecked_selection(&MemoryOrderStore::new()).await;
}

#[tokio::test]
async fn test_purge_resets_interrupted_runs() {
    contract::purge_resets_interrupted_runs(&MemoryOrderStore::new()).await;
}

#[tokio::test]
async fn test_deliverable_selection() {
    contract::deliverable_selection(&MemoryOrderStore::new()).await;
}

#[tokio::test]
async fn test_batch_is_all_or_nothing() {
    contract::batch_is_all_or_nothing(&MemoryOrderStore::new()).await;
}

#[tokio::test]
async fn test_requeue_clears_downstream() {
    contract::requeue_clears_downstream(&MemoryOrderStore::new()).await;
}

#[tokio::test]
async fn test_artifact_survives_update_until_requeue() {
    let store = MemoryOrderStore::new();
    let mut order = store.insert(Order::new("{}", at(0))).await.unwrap();
    order.mark_precheck_passed(serde_json::json!({}), at(1));
    store.update(&order).await.unwrap();

    store.store_artifact(&order.order_id, "JVBERi0=").unwrap();
    order.mark_processed(true, at(2));
    store.update(&order).await.unwrap();

    let stored = store.get(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.result.as_deref(), Some("JVBERi0="));

    let requeued = store.requeue(&order.order_id).await.unwrap();
    assert_eq!(requeued.result, None);
}
