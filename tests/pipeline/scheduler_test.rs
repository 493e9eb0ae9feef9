/*!
 * Job Scheduler Tests
 * Purge on start, precheck outcomes and re-polling
 */

use crate::common::*;
use dose_kernel::config::SchedulerConfig;
use dose_kernel::core::types::now;
use dose_kernel::orders::{MemoryOrderStore, Order, OrderStatus, OrderStore};
use dose_kernel::JobScheduler;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        workers: 2,
        poll_interval: Duration::from_millis(20),
        recheck_delay: Duration::ZERO,
    }
}

struct Harness {
    store: MemoryOrderStore,
    compounds: Arc<FakeCompounds>,
    trigger: Arc<RecordingTrigger>,
    scheduler: JobScheduler,
}

fn harness(config: SchedulerConfig) -> Harness {
    let store = MemoryOrderStore::new();
    let compounds = FakeCompounds::new();
    let trigger = Arc::new(RecordingTrigger::default());
    let scheduler = JobScheduler::new(
        Arc::new(store.clone()),
        pipeline(compounds.clone(), FakeIndividuals::new()),
        trigger.clone(),
        config,
    );
    Harness {
        store,
        compounds,
        trigger,
        scheduler,
    }
}

/// `precheck_passed = false` with `started_at` set only after a rejection
fn assert_start_invariant(orders: &[Order]) {
    for order in orders {
        if !order.precheck_passed && order.started_at.is_some() {
            assert!(
                order.precheck_error.is_some(),
                "order {} started without passing or failing",
                order.order_id
            );
        }
    }
}

#[tokio::test]
async fn test_passing_order_is_started_and_launched() {
    let mut h = harness(fast_config());
    let order = h.store.insert(Order::new(PATIENT_INPUT, now())).await.unwrap();

    h.scheduler.start().await.unwrap();
    let trigger = h.trigger.clone();
    assert!(wait_for(Duration::from_secs(5), || trigger.jobs.lock().len() == 1).await);
    h.scheduler.stop().await;

    let stored = h.store.get(&order.order_id).await.unwrap().unwrap();
    assert!(stored.precheck_passed);
    assert_eq!(stored.status, OrderStatus::Processing);
    assert!(stored.started_at.is_some());
    assert!(stored.precheck_error.is_none());
    assert_eq!(stored.precheck_result.as_ref().unwrap()["model_id"], "m1");

    let jobs = h.trigger.jobs.lock().clone();
    assert_eq!(jobs[0].order_id, order.order_id);
    assert!(jobs[0].adjust);
    assert_eq!(jobs[0].model_id.as_deref(), Some("m1"));
}

#[tokio::test]
async fn test_rejected_order_is_started_without_adjustment() {
    let mut h = harness(fast_config());
    let order = h
        .store
        .insert(Order::new(COMBINATION_INPUT, now()))
        .await
        .unwrap();

    h.scheduler.start().await.unwrap();
    let trigger = h.trigger.clone();
    assert!(wait_for(Duration::from_secs(5), || trigger.jobs.lock().len() == 1).await);
    h.scheduler.stop().await;

    let stored = h.store.get(&order.order_id).await.unwrap().unwrap();
    assert!(!stored.precheck_passed);
    assert!(stored.started_at.is_some());
    assert_eq!(stored.status, OrderStatus::Processing);
    let message = stored.precheck_error.clone().unwrap();
    assert!(message.contains("exactly one active substance"));

    let job = h.trigger.jobs.lock()[0].clone();
    assert!(!job.adjust);
    assert_eq!(job.error_message.as_deref(), Some(message.as_str()));
    assert_start_invariant(&h.store.all());
}

#[tokio::test]
async fn test_undecodable_input_is_rejected() {
    let mut h = harness(fast_config());
    let order = h
        .store
        .insert(Order::new("{\"age\": \"old\"}", now()))
        .await
        .unwrap();

    h.scheduler.start().await.unwrap();
    let trigger = h.trigger.clone();
    assert!(wait_for(Duration::from_secs(5), || trigger.jobs.lock().len() == 1).await);
    h.scheduler.stop().await;

    let stored = h.store.get(&order.order_id).await.unwrap().unwrap();
    assert!(stored
        .precheck_error
        .unwrap()
        .starts_with("invalid order input"));
    assert!(stored.precheck_result.is_none());
}

#[tokio::test]
async fn test_recoverable_failure_is_polled_again() {
    let mut h = harness(fast_config());
    h.compounds.set_outage(true);
    let order = h.store.insert(Order::new(PATIENT_INPUT, now())).await.unwrap();

    h.scheduler.start().await.unwrap();
    let store = h.store.clone();
    assert!(
        wait_for(Duration::from_secs(5), || store.all()[0].last_prechecked_at.is_some()).await
    );

    let deferred = h.store.get(&order.order_id).await.unwrap().unwrap();
    assert!(deferred.started_at.is_none());
    assert!(deferred.precheck_error.is_none());
    assert_eq!(deferred.status, OrderStatus::Queued);
    assert!(h.trigger.jobs.lock().is_empty());

    h.compounds.set_outage(false);
    let trigger = h.trigger.clone();
    assert!(wait_for(Duration::from_secs(5), || trigger.jobs.lock().len() == 1).await);
    h.scheduler.stop().await;

    let stored = h.store.get(&order.order_id).await.unwrap().unwrap();
    assert!(stored.precheck_passed);
    assert_eq!(h.trigger.jobs.lock().len(), 1);
}

#[tokio::test]
async fn test_recheck_delay_holds_back_deferred_orders() {
    let mut h = harness(SchedulerConfig {
        recheck_delay: Duration::from_secs(3600),
        ..fast_config()
    });
    let mut order = h.store.insert(Order::new(PATIENT_INPUT, now())).await.unwrap();
    order.mark_precheck_deferred(now());
    h.store.update(&order).await.unwrap();

    h.scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    h.scheduler.stop().await;

    assert!(h.trigger.jobs.lock().is_empty());
}

#[tokio::test]
async fn test_purge_on_start_resets_interrupted_orders() {
    let mut h = harness(SchedulerConfig {
        // keep the poller quiet after its first tick
        poll_interval: Duration::from_secs(3600),
        ..fast_config()
    });
    h.compounds.set_outage(true);

    let mut interrupted = h.store.insert(Order::new(PATIENT_INPUT, now())).await.unwrap();
    interrupted.mark_precheck_passed(serde_json::json!({"model_id": "m1"}), now());
    h.store.update(&interrupted).await.unwrap();

    let mut rejected = h
        .store
        .insert(Order::new(COMBINATION_INPUT, now()))
        .await
        .unwrap();
    rejected.mark_precheck_rejected("two substances", None, now());
    h.store.update(&rejected).await.unwrap();

    let mut finished = h.store.insert(Order::new(PATIENT_INPUT, now())).await.unwrap();
    finished.mark_precheck_passed(serde_json::json!({}), now());
    finished.mark_processed(true, now());
    h.store.update(&finished).await.unwrap();

    let purged = h.scheduler.start().await.unwrap();
    h.scheduler.stop().await;
    assert_eq!(purged, 1);

    let reset = h.store.get(&interrupted.order_id).await.unwrap().unwrap();
    assert!(!reset.precheck_passed);
    assert!(reset.started_at.is_none());
    assert!(reset.precheck_result.is_none());
    assert_eq!(reset.status, OrderStatus::Queued);

    let untouched = h.store.get(&rejected.order_id).await.unwrap().unwrap();
    assert_eq!(untouched.precheck_error.as_deref(), Some("two substances"));
    assert!(untouched.started_at.is_some());

    let done = h.store.get(&finished.order_id).await.unwrap().unwrap();
    assert_eq!(done.status, OrderStatus::Processed);
}

#[tokio::test]
async fn test_many_orders_each_launched_once() {
    let mut h = harness(SchedulerConfig {
        workers: 3,
        ..fast_config()
    });
    for _ in 0..20 {
        h.store.insert(Order::new(PATIENT_INPUT, now())).await.unwrap();
    }

    h.scheduler.start().await.unwrap();
    let trigger = h.trigger.clone();
    assert!(wait_for(Duration::from_secs(10), || trigger.jobs.lock().len() >= 20).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.scheduler.stop().await;

    let mut launched: Vec<String> = h
        .trigger
        .jobs
        .lock()
        .iter()
        .map(|j| j.order_id.clone())
        .collect();
    launched.sort();
    launched.dedup();
    assert_eq!(launched.len(), 20);
    assert_eq!(h.trigger.jobs.lock().len(), 20);
    assert_start_invariant(&h.store.all());
}

#[tokio::test]
async fn test_stop_halts_polling() {
    let mut h = harness(fast_config());
    h.scheduler.start().await.unwrap();
    assert!(h.scheduler.is_running());
    h.scheduler.stop().await;
    assert!(!h.scheduler.is_running());

    h.store.insert(Order::new(PATIENT_INPUT, now())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.trigger.jobs.lock().is_empty());
    assert!(h.store.all()[0].last_prechecked_at.is_none());
}
