/*!
 * Precheck Worker
 * Runs the pipeline for one order and records the outcome
 */

use super::task::SchedulerContext;
use crate::core::types::now;
use crate::orders::{Order, PatientData};
use crate::precheck::{PrecheckError, PrecheckFailure};
use crate::process::SimulationJob;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, instrument, warn};

/// Pull orders off the shared queue until it closes or the scheduler stops
pub(super) async fn run_worker(
    worker: usize,
    ctx: Arc<SchedulerContext>,
    queue: Arc<Mutex<mpsc::Receiver<Order>>>,
) {
    debug!(worker, "Precheck worker started");
    loop {
        let next = {
            let mut queue = queue.lock().await;
            tokio::select! {
                _ = ctx.cancel.cancelled() => None,
                order = queue.recv() => order,
            }
        };
        let Some(order) = next else { break };

        let order_id = order.order_id.clone();
        precheck_order(worker, &ctx, order).await;
        ctx.in_flight.remove(&order_id);
    }
    debug!(worker, "Precheck worker stopped");
}

#[instrument(skip(ctx, order), fields(order_id = %order.order_id))]
async fn precheck_order(worker: usize, ctx: &SchedulerContext, order: Order) {
    // The poll snapshot may predate another worker's write
    let mut order = match ctx.store.get(&order.order_id).await {
        Ok(Some(fresh)) if fresh.is_unchecked(now()) => fresh,
        Ok(_) => {
            debug!("Order no longer unchecked, skipping");
            return;
        }
        Err(e) => {
            warn!(error = %e, "Failed to reload order");
            return;
        }
    };

    let outcome = match PatientData::from_input(&order.input) {
        Ok(patient) => ctx.pipeline.check(&patient, &ctx.cancel).await,
        Err(e) => Err(PrecheckFailure {
            error: PrecheckError::unrecoverable(format!("invalid order input: {}", e)),
            partial: Default::default(),
        }),
    };
    let at = now();

    let job = match outcome {
        Ok(result) => {
            info!("Precheck passed");
            let model_id = result.model_id.clone();
            order.mark_precheck_passed(result.to_value(), at);
            Some(SimulationJob {
                order_id: order.order_id.clone(),
                adjust: true,
                error_message: None,
                model_id,
            })
        }
        Err(failure) if failure.error.is_recoverable() => {
            if ctx.cancel.is_cancelled() {
                debug!("Precheck interrupted by shutdown");
                return;
            }
            warn!(error = %failure.error, "Precheck deferred");
            order.mark_precheck_deferred(at);
            None
        }
        Err(failure) => {
            info!(error = %failure.error, "Precheck rejected order");
            let message = failure.error.message().to_string();
            let partial = (failure.partial != Default::default()).then(|| failure.partial.to_value());
            order.mark_precheck_rejected(message.clone(), partial, at);
            Some(SimulationJob {
                order_id: order.order_id.clone(),
                adjust: false,
                error_message: Some(message),
                model_id: None,
            })
        }
    };

    // Launch only what storage knows was started
    if let Err(e) = ctx.store.update(&order).await {
        error!(error = %e, "Failed to persist precheck outcome");
        return;
    }
    if let Some(job) = job {
        ctx.trigger.launch(job);
    }
}
