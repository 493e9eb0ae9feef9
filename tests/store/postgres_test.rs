/*!
 * Postgres Store Tests
 * Run against a disposable database with
 * `DATABASE_URL=postgres://... cargo test --test store -- --ignored`
 */

use super::contract::{self, at};
use dose_kernel::orders::{Order, OrderStore, PgOrderStore};
use pretty_assertions::assert_eq;
use serial_test::serial;
use sqlx::postgres::PgPool;
use std::time::Duration;

/// Store over an emptied `orders` table, or `None` without a database
async fn fresh_store() -> Option<(PgOrderStore, PgPool)> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let store = PgOrderStore::connect(&url, 2, Duration::from_secs(5))
        .await
        .unwrap();
    let pool = PgPool::connect(&url).await.unwrap();
    sqlx::query("TRUNCATE orders RESTART IDENTITY")
        .execute(&pool)
        .await
        .unwrap();
    Some((store, pool))
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_insert_and_get() {
    let Some((store, _)) = fresh_store().await else { return };
    contract::insert_and_get(&store).await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_update_round_trip() {
    let Some((store, _)) = fresh_store().await else { return };
    contract::update_round_trip(&store).await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_unchecked_selection() {
    let Some((store, _)) = fresh_store().await else { return };
    contract::unchecked_selection(&store).await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_purge_resets_interrupted_runs() {
    let Some((store, _)) = fresh_store().await else { return };
    contract::purge_resets_interrupted_runs(&store).await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_deliverable_selection() {
    let Some((store, _)) = fresh_store().await else { return };
    contract::deliverable_selection(&store).await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_batch_is_all_or_nothing() {
    let Some((store, _)) = fresh_store().await else { return };
    contract::batch_is_all_or_nothing(&store).await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_requeue_clears_downstream() {
    let Some((store, _)) = fresh_store().await else { return };
    contract::requeue_clears_downstream(&store).await;
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_artifact_survives_update_until_requeue() {
    let Some((store, pool)) = fresh_store().await else { return };
    let mut order = store.insert(Order::new("{}", at(0))).await.unwrap();
    order.mark_precheck_passed(serde_json::json!({}), at(1));
    store.update(&order).await.unwrap();

    // the simulation script writes the artifact column directly
    sqlx::query("UPDATE orders SET result = $2 WHERE order_id = $1")
        .bind(&order.order_id)
        .bind("JVBERi0=")
        .execute(&pool)
        .await
        .unwrap();
    order.mark_processed(true, at(2));
    store.update(&order).await.unwrap();

    let stored = store.get(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.result.as_deref(), Some("JVBERi0="));
    assert!(stored.dose_adjusted);

    let requeued = store.requeue(&order.order_id).await.unwrap();
    assert_eq!(requeued.result, None);
}
