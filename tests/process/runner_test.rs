/*!
 * Simulation Runner Tests
 * Timeout retry against a real script and persisted outcomes
 */

use super::executor_test::{config_for, script};
use dose_kernel::config::SimulationConfig;
use dose_kernel::core::limits::TIMEOUT_FALLBACK_MESSAGE;
use dose_kernel::core::types::now;
use dose_kernel::orders::{MemoryOrderStore, Order, OrderStatus, OrderStore};
use dose_kernel::precheck::ModelCatalog;
use dose_kernel::process::{platform_supervisor, ProcessExecutor, SimulationJob, SimulationRunner};
use dose_kernel::SimulationTrigger;
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn test_timeout_retried_without_adjustment() {
    let dir = tempfile::tempdir().unwrap();
    let calls = dir.path().join("calls");
    // Adjusting runs hang; the fallback run answers and records its message
    let path = script(
        &dir,
        &format!(
            r#"echo "$2|$3" >> {calls}
if [ "$2" = "TRUE" ]; then exec sleep 30; fi
echo '{{"dose_adjusted": false, "error": false}}'"#,
            calls = calls.display()
        ),
    );
    let config = SimulationConfig {
        timeout: Duration::from_millis(500),
        ..config_for(&path)
    };

    let store = MemoryOrderStore::new();
    let mut order = store
        .insert(Order::new(crate::common::PATIENT_INPUT, now()))
        .await
        .unwrap();
    order.mark_precheck_passed(serde_json::json!({"model_id": "m1"}), now());
    store.update(&order).await.unwrap();

    let executor = Arc::new(ProcessExecutor::new(config.clone(), platform_supervisor()));
    let runner = SimulationRunner::new(
        executor,
        Arc::new(store.clone()),
        ModelCatalog::new(crate::common::models()),
        &config,
    );

    runner.launch(SimulationJob {
        order_id: order.order_id.clone(),
        adjust: true,
        error_message: None,
        model_id: Some("m1".to_string()),
    });
    runner.drain().await;

    let lines: Vec<String> = std::fs::read_to_string(&calls)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(
        lines,
        vec![
            "TRUE|".to_string(),
            format!("FALSE|{}", TIMEOUT_FALLBACK_MESSAGE)
        ]
    );

    let stored = store.get(&order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Processed);
    assert!(!stored.dose_adjusted);
    assert!(stored.processed_at.is_some());
}
