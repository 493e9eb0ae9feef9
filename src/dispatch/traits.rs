/*!
 * Dispatch Traits
 */

use super::types::DeliveryResult;
use async_trait::async_trait;

/// Downstream consumer of finished artifacts
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Upload one decoded artifact; `Ok` only once delivery is confirmed
    async fn upload(&self, order_id: &str, artifact: Vec<u8>) -> DeliveryResult<()>;
}
