/*!
 * Simulation Runner
 * Launches simulations for prechecked orders and records their outcome
 *
 * A timed-out run is repeated exactly once without adjustment so the script
 * can still render an explanatory artifact; any other failure is final.
 */

use super::traits::Simulator;
use super::types::*;
use crate::config::SimulationConfig;
use crate::core::limits::TIMEOUT_FALLBACK_MESSAGE;
use crate::core::types::{absolute_path, now, OrderId};
use crate::orders::{OrderStore, StoreError, StoreResult};
use crate::precheck::ModelCatalog;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

/// Work item handed over by the scheduler once an order's precheck settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationJob {
    pub order_id: OrderId,
    pub adjust: bool,
    pub error_message: Option<String>,
    pub model_id: Option<String>,
}

/// Fire-and-forget launch of a simulation
pub trait SimulationTrigger: Send + Sync {
    fn launch(&self, job: SimulationJob);
}

/// Semaphore-bounded simulation launcher
#[derive(Clone)]
pub struct SimulationRunner {
    inner: Arc<RunnerInner>,
}

struct RunnerInner {
    simulator: Arc<dyn Simulator>,
    store: Arc<dyn OrderStore>,
    catalog: ModelCatalog,
    fallback_model: PathBuf,
    timeout: Duration,
    permits: Arc<Semaphore>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SimulationRunner {
    pub fn new(
        simulator: Arc<dyn Simulator>,
        store: Arc<dyn OrderStore>,
        catalog: ModelCatalog,
        config: &SimulationConfig,
    ) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                simulator,
                store,
                catalog,
                fallback_model: config.fallback_model.clone(),
                timeout: config.timeout,
                permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Absolute model file for `job`
    pub fn model_path(&self, job: &SimulationJob) -> PathBuf {
        let path = job
            .model_id
            .as_deref()
            .filter(|_| job.adjust)
            .and_then(|id| self.inner.catalog.path_of(id))
            .unwrap_or(&self.inner.fallback_model);
        absolute_path(path)
    }

    /// Run the job (with its timeout retry) and persist the outcome
    #[instrument(skip(self, job), fields(order_id = %job.order_id, adjust = job.adjust))]
    pub async fn run_job(&self, job: SimulationJob) -> StoreResult<()> {
        let Ok(_permit) = self.inner.permits.clone().acquire_owned().await else {
            warn!("Simulation runner closed, dropping job");
            return Ok(());
        };

        let request = RunRequest {
            job_id: job.order_id.clone(),
            adjust: job.adjust,
            error_message: job.error_message.clone(),
            model_path: self.model_path(&job),
            timeout: self.inner.timeout,
        };

        let outcome = match self.inner.simulator.run(&request).await {
            Err(ProcessError::Timeout(limit)) => {
                warn!(timeout = ?limit, "Simulation timed out, retrying without adjustment");
                let retry = RunRequest {
                    adjust: false,
                    error_message: Some(TIMEOUT_FALLBACK_MESSAGE.to_string()),
                    model_path: absolute_path(&self.inner.fallback_model),
                    ..request
                };
                self.inner.simulator.run(&retry).await
            }
            other => other,
        };

        self.persist(&job.order_id, outcome).await
    }

    async fn persist(&self, order_id: &OrderId, outcome: ProcessResult<RunOutput>) -> StoreResult<()> {
        let mut order = self
            .inner
            .store
            .get(order_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(order_id.clone()))?;

        match outcome {
            Ok(output) => {
                info!(dose_adjusted = output.dose_adjusted, "Simulation completed");
                order.mark_processed(output.dose_adjusted, now());
            }
            Err(e) => {
                if let ProcessError::Script {
                    call_stack: Some(ref stack),
                    ..
                } = e
                {
                    warn!(call_stack = %stack, "Simulation script failed");
                }
                error!(error = %e, "Simulation failed");
                order.mark_process_failed(e.order_message(), now());
            }
        }
        self.inner.store.update(&order).await
    }

    /// Await every launched job
    pub async fn drain(&self) {
        let tasks: Vec<_> = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Simulation task panicked");
            }
        }
    }

    /// Jobs launched and not yet finished
    pub fn active(&self) -> usize {
        self.inner
            .tasks
            .lock()
            .iter()
            .filter(|t| !t.is_finished())
            .count()
    }
}

impl SimulationTrigger for SimulationRunner {
    fn launch(&self, job: SimulationJob) {
        let runner = self.clone();
        let order_id = job.order_id.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = runner.run_job(job).await {
                error!(order_id = %order_id, error = %e, "Failed to record simulation outcome");
            }
        });

        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }
}
