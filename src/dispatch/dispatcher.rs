/*!
 * Result Dispatcher
 * Periodic delivery of finished artifacts with retry bookkeeping
 */

use super::traits::ArtifactSink;
use super::types::*;
use crate::config::DispatchConfig;
use crate::core::limits::MAX_SEND_RETRY_BACKOFF;
use crate::core::types::{now, Timestamp};
use crate::orders::{Order, OrderStore, StoreResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Delivers processed orders to an [`ArtifactSink`]
#[derive(Clone)]
pub struct ResultDispatcher {
    store: Arc<dyn OrderStore>,
    sink: Arc<dyn ArtifactSink>,
    config: DispatchConfig,
}

impl ResultDispatcher {
    pub fn new(store: Arc<dyn OrderStore>, sink: Arc<dyn ArtifactSink>, config: DispatchConfig) -> Self {
        Self {
            store,
            sink,
            config,
        }
    }

    /// Deliver one batch of due orders and persist every outcome together
    #[instrument(skip(self))]
    pub async fn dispatch_once(&self, now: Timestamp) -> StoreResult<DispatchReport> {
        let mut batch = self
            .store
            .fetch_deliverable(self.config.batch_size, now)
            .await?;
        let mut report = DispatchReport::default();
        if batch.is_empty() {
            return Ok(report);
        }

        for order in &mut batch {
            self.deliver(order, now, &mut report).await;
        }

        self.store.update_batch(&batch).await?;
        info!(
            sent = report.sent,
            failed = report.failed,
            invalid = report.invalid,
            "Dispatch batch persisted"
        );
        Ok(report)
    }

    async fn deliver(&self, order: &mut Order, now: Timestamp, report: &mut DispatchReport) {
        let artifact = match decode_artifact(order.result.as_deref()) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(order_id = %order.order_id, error = %e, "Artifact unusable, not retrying");
                order.mark_artifact_invalid(e.to_string());
                report.invalid += 1;
                return;
            }
        };

        order.record_send_attempt(now);
        match self.sink.upload(&order.order_id, artifact).await {
            Ok(()) => {
                order.mark_sent(now);
                report.sent += 1;
            }
            Err(e) => {
                warn!(
                    order_id = %order.order_id,
                    send_tries = order.send_tries,
                    error = %e,
                    "Delivery failed"
                );
                order.mark_send_failed(
                    e.to_string(),
                    now,
                    self.config.retry_backoff,
                    MAX_SEND_RETRY_BACKOFF,
                    self.config.max_send_tries,
                );
                report.failed += 1;
            }
        }
    }

    /// Tick every `dispatch.interval` until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval = ?self.config.interval, batch = self.config.batch_size, "Dispatcher loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.dispatch_once(now()).await {
                        error!(error = %e, "Dispatch tick failed");
                    }
                }
            }
        }
        debug!("Dispatcher loop stopped");
    }

    /// Run the loop on its own task
    pub fn spawn(self) -> DispatcherTask {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(self.run(cancel.clone()));
        DispatcherTask {
            cancel,
            handle: Some(handle),
        }
    }
}

/// Handle to the background dispatcher loop
pub struct DispatcherTask {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl DispatcherTask {
    /// Stop after the current tick
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Dispatcher shutdown error");
            } else {
                info!("Dispatcher shutdown complete");
            }
        }
    }
}

impl Drop for DispatcherTask {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.cancel.cancel();
        }
    }
}

/// Base64 artifact text to bytes; whitespace from line-wrapped encoders is ignored
pub fn decode_artifact(artifact: Option<&str>) -> DeliveryResult<Vec<u8>> {
    let text = artifact
        .map(|a| a.split_whitespace().collect::<String>())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| DeliveryError::InvalidArtifact("no artifact stored".to_string()))?;

    let bytes = BASE64
        .decode(text.as_bytes())
        .map_err(|e| DeliveryError::InvalidArtifact(format!("artifact is not valid base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(DeliveryError::InvalidArtifact("artifact is empty".to_string()));
    }
    Ok(bytes)
}
