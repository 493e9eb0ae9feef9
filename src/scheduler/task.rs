/*!
 * Job Scheduler
 * Timer-driven poller feeding a fixed pool of precheck workers
 *
 * The poller only fetches as many unchecked orders as the bounded queue can
 * take, so storage is never drained faster than the workers progress.
 */

use super::worker::run_worker;
use crate::config::SchedulerConfig;
use crate::core::types::{now, OrderId};
use crate::orders::{Order, OrderStore, StoreResult};
use crate::precheck::PrecheckPipeline;
use crate::process::SimulationTrigger;
use chrono::Duration as ChronoDuration;
use dashmap::DashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// State shared by the poller and the workers
pub(super) struct SchedulerContext {
    pub store: Arc<dyn OrderStore>,
    pub pipeline: Arc<PrecheckPipeline>,
    pub trigger: Arc<dyn SimulationTrigger>,
    pub cancel: CancellationToken,
    /// Orders queued or being prechecked by this scheduler
    pub in_flight: DashSet<OrderId>,
}

struct Running {
    cancel: CancellationToken,
    poller: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
}

/// Crash-recoverable precheck scheduler
pub struct JobScheduler {
    store: Arc<dyn OrderStore>,
    pipeline: Arc<PrecheckPipeline>,
    trigger: Arc<dyn SimulationTrigger>,
    config: SchedulerConfig,
    running: Option<Running>,
}

impl JobScheduler {
    pub fn new(
        store: Arc<dyn OrderStore>,
        pipeline: Arc<PrecheckPipeline>,
        trigger: Arc<dyn SimulationTrigger>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            pipeline,
            trigger,
            config,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Purge interrupted orders, then spawn the workers and the poller
    ///
    /// Returns the number of orders the purge reset.
    pub async fn start(&mut self) -> StoreResult<u64> {
        if self.running.is_some() {
            warn!("Job scheduler already running");
            return Ok(0);
        }

        let purged = self.store.purge_interrupted().await?;
        if purged > 0 {
            info!(purged, "Reset orders interrupted by the previous run");
        }

        let cancel = CancellationToken::new();
        let ctx = Arc::new(SchedulerContext {
            store: self.store.clone(),
            pipeline: self.pipeline.clone(),
            trigger: self.trigger.clone(),
            cancel: cancel.clone(),
            in_flight: DashSet::new(),
        });

        let workers = self.config.workers.max(1);
        let (tx, rx) = mpsc::channel(self.config.queue_capacity());
        let queue = Arc::new(Mutex::new(rx));

        let worker_handles = (0..workers)
            .map(|worker| tokio::spawn(run_worker(worker, ctx.clone(), queue.clone())))
            .collect();
        let poller = tokio::spawn(run_poller(ctx, tx, self.config.clone()));

        info!(
            workers,
            capacity = self.config.queue_capacity(),
            poll_interval = ?self.config.poll_interval,
            "Job scheduler started"
        );

        self.running = Some(Running {
            cancel,
            poller,
            workers: worker_handles,
        });
        Ok(purged)
    }

    /// Cancel the poller and workers and wait for them to finish
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.cancel.cancel();

        if let Err(e) = running.poller.await {
            warn!(error = %e, "Poller shutdown error");
        }
        for worker in running.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Worker shutdown error");
            }
        }
        info!("Job scheduler stopped");
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        if let Some(ref running) = self.running {
            running.cancel.cancel();
        }
    }
}

async fn run_poller(ctx: Arc<SchedulerContext>, tx: mpsc::Sender<Order>, config: SchedulerConfig) {
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            _ = interval.tick() => poll_once(&ctx, &tx, &config).await,
        }
    }
    debug!("Poller stopped");
}

async fn poll_once(ctx: &SchedulerContext, tx: &mpsc::Sender<Order>, config: &SchedulerConfig) {
    let free = tx.capacity();
    if free == 0 {
        trace!("Precheck queue full, skipping poll");
        return;
    }

    let recheck_before = ChronoDuration::from_std(config.recheck_delay)
        .map(|delay| now() - delay)
        .unwrap_or_else(|_| now());
    // Over-fetch by the in-flight count so skipped orders do not starve the queue
    let limit = free + ctx.in_flight.len();
    let orders = match ctx.store.fetch_unchecked(limit, recheck_before).await {
        Ok(orders) => orders,
        Err(e) => {
            error!(error = %e, "Failed to fetch unchecked orders");
            return;
        }
    };

    let mut sent = 0;
    for order in orders {
        if sent == free {
            break;
        }
        if !ctx.in_flight.insert(order.order_id.clone()) {
            continue;
        }

        let order_id = order.order_id.clone();
        let delivered = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => false,
            result = tx.send(order) => result.is_ok(),
        };
        if !delivered {
            ctx.in_flight.remove(&order_id);
            return;
        }
        sent += 1;
    }

    if sent > 0 {
        debug!(sent, "Dispatched orders to precheck workers");
    }
}
