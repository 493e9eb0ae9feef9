/*!
 * Order Store Traits
 * Narrow query contract the pipeline needs from the relational store
 */

use super::types::*;
use crate::core::types::{OrderId, Timestamp};
use async_trait::async_trait;

/// Persistent order storage
///
/// Implementations are internally synchronised and shared as
/// `Arc<dyn OrderStore>`; callers add no locking of their own.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a new order and return it with its row key assigned
    async fn insert(&self, order: Order) -> StoreResult<Order>;

    /// Look up an order by its external identifier
    async fn get(&self, order_id: &str) -> StoreResult<Option<Order>>;

    /// Reset orders whose simulation was launched after a passed precheck but
    /// never completed. Returns the number of orders reset.
    async fn purge_interrupted(&self) -> StoreResult<u64>;

    /// Oldest unchecked orders whose last deferred precheck is not after
    /// `recheck_before`
    async fn fetch_unchecked(
        &self,
        limit: usize,
        recheck_before: Timestamp,
    ) -> StoreResult<Vec<Order>>;

    /// Write every mutable column of one order
    async fn update(&self, order: &Order) -> StoreResult<()>;

    /// Processed, undelivered orders due at `now`, fewest send attempts first
    async fn fetch_deliverable(&self, limit: usize, now: Timestamp) -> StoreResult<Vec<Order>>;

    /// Write a batch of orders at once
    async fn update_batch(&self, orders: &[Order]) -> StoreResult<()>;

    /// Clear the downstream chain of an order and queue it again
    async fn requeue(&self, order_id: &OrderId) -> StoreResult<Order>;
}
