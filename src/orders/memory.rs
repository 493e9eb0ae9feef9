/*!
 * In-Memory Order Store
 * Process-local store with the same query semantics as the Postgres store
 */

use super::traits::OrderStore;
use super::types::*;
use crate::core::types::{OrderId, RowId, Timestamp};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Order store backed by a `BTreeMap` keyed by row id
#[derive(Clone, Default)]
pub struct MemoryOrderStore {
    orders: Arc<RwLock<BTreeMap<RowId, Order>>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored order in row order
    pub fn all(&self) -> Vec<Order> {
        self.orders.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }

    /// Write the artifact column the way the simulation script does
    pub fn store_artifact(&self, order_id: &str, artifact: impl Into<String>) -> StoreResult<()> {
        let mut orders = self.orders.write();
        let order = orders
            .values_mut()
            .find(|o| o.order_id == order_id)
            .ok_or_else(|| StoreError::NotFound(order_id.to_string()))?;
        order.result = Some(artifact.into());
        Ok(())
    }

    fn write_one(orders: &mut BTreeMap<RowId, Order>, order: &Order) -> StoreResult<()> {
        match orders.get_mut(&order.id) {
            Some(stored) => {
                // identity and input are immutable; the artifact belongs to the script
                let input = std::mem::take(&mut stored.input);
                let order_id = std::mem::take(&mut stored.order_id);
                let result = stored.result.take();
                *stored = order.clone();
                stored.input = input;
                stored.order_id = order_id;
                stored.result = result;
                Ok(())
            }
            None => Err(StoreError::NotFound(order.order_id.clone())),
        }
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert(&self, mut order: Order) -> StoreResult<Order> {
        order.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.orders.write().insert(order.id, order.clone());
        debug!(order_id = %order.order_id, id = order.id, "order stored");
        Ok(order)
    }

    async fn get(&self, order_id: &str) -> StoreResult<Option<Order>> {
        Ok(self
            .orders
            .read()
            .values()
            .find(|o| o.order_id == order_id)
            .cloned())
    }

    async fn purge_interrupted(&self) -> StoreResult<u64> {
        let mut orders = self.orders.write();
        let mut purged = 0;
        for order in orders.values_mut().filter(|o| o.is_interrupted()) {
            order.reset_precheck();
            purged += 1;
        }
        Ok(purged)
    }

    async fn fetch_unchecked(
        &self,
        limit: usize,
        recheck_before: Timestamp,
    ) -> StoreResult<Vec<Order>> {
        let orders = self.orders.read();
        let mut unchecked: Vec<Order> = orders
            .values()
            .filter(|o| o.is_unchecked(recheck_before))
            .cloned()
            .collect();
        unchecked.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        unchecked.truncate(limit);
        Ok(unchecked)
    }

    async fn update(&self, order: &Order) -> StoreResult<()> {
        Self::write_one(&mut self.orders.write(), order)
    }

    async fn fetch_deliverable(&self, limit: usize, now: Timestamp) -> StoreResult<Vec<Order>> {
        let orders = self.orders.read();
        let mut deliverable: Vec<Order> = orders
            .values()
            .filter(|o| o.is_deliverable(now))
            .cloned()
            .collect();
        deliverable.sort_by(|a, b| a.send_tries.cmp(&b.send_tries).then(a.id.cmp(&b.id)));
        deliverable.truncate(limit);
        Ok(deliverable)
    }

    async fn update_batch(&self, batch: &[Order]) -> StoreResult<()> {
        let mut orders = self.orders.write();
        // All or nothing, like the transactional store
        if let Some(missing) = batch.iter().find(|o| !orders.contains_key(&o.id)) {
            return Err(StoreError::NotFound(missing.order_id.clone()));
        }
        for order in batch {
            Self::write_one(&mut orders, order)?;
        }
        Ok(())
    }

    async fn requeue(&self, order_id: &OrderId) -> StoreResult<Order> {
        let mut orders = self.orders.write();
        let order = orders
            .values_mut()
            .find(|o| &o.order_id == order_id)
            .ok_or_else(|| StoreError::NotFound(order_id.clone()))?;
        order.requeue();
        Ok(order.clone())
    }
}
