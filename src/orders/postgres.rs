/*!
 * Postgres Order Store
 * `orders` table access through runtime-checked sqlx queries
 */

use super::traits::OrderStore;
use super::types::*;
use crate::core::types::{OrderId, Timestamp};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};

const COLUMNS: &str = "id, order_id, input, status, created_at, \
     precheck_result, precheck_passed, precheck_error, last_prechecked_at, started_at, \
     result, dose_adjusted, process_error, processed_at, \
     sent_at, send_tries, last_send_attempt_at, send_error, next_send_at";

/// Order store backed by a pooled Postgres connection
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Connect a pool and apply the embedded migrations
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {}", e)))?;

        info!(max_connections, "Order store connected");
        Ok(Self { pool })
    }

    fn decode(row: &PgRow) -> StoreResult<Order> {
        let status: String = row.try_get("status")?;
        Ok(Order {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            input: row.try_get("input")?,
            status: status.parse()?,
            created_at: row.try_get("created_at")?,
            precheck_result: row.try_get("precheck_result")?,
            precheck_passed: row.try_get("precheck_passed")?,
            precheck_error: row.try_get("precheck_error")?,
            last_prechecked_at: row.try_get("last_prechecked_at")?,
            started_at: row.try_get("started_at")?,
            result: row.try_get("result")?,
            dose_adjusted: row.try_get("dose_adjusted")?,
            process_error: row.try_get("process_error")?,
            processed_at: row.try_get("processed_at")?,
            sent_at: row.try_get("sent_at")?,
            send_tries: row.try_get("send_tries")?,
            last_send_attempt_at: row.try_get("last_send_attempt_at")?,
            send_error: row.try_get("send_error")?,
            next_send_at: row.try_get("next_send_at")?,
        })
    }

    /// Every mutable column except `result`, which only the simulation script
    /// and requeue write
    async fn write_one<'e, E>(executor: E, order: &Order) -> StoreResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let updated = sqlx::query(
            "UPDATE orders SET \
                status = $2, precheck_result = $3, precheck_passed = $4, precheck_error = $5, \
                last_prechecked_at = $6, started_at = $7, dose_adjusted = $8, \
                process_error = $9, processed_at = $10, sent_at = $11, send_tries = $12, \
                last_send_attempt_at = $13, send_error = $14, next_send_at = $15 \
             WHERE id = $1",
        )
        .bind(order.id)
        .bind(order.status.as_str())
        .bind(order.precheck_result.clone())
        .bind(order.precheck_passed)
        .bind(order.precheck_error.clone())
        .bind(order.last_prechecked_at)
        .bind(order.started_at)
        .bind(order.dose_adjusted)
        .bind(order.process_error.clone())
        .bind(order.processed_at)
        .bind(order.sent_at)
        .bind(order.send_tries)
        .bind(order.last_send_attempt_at)
        .bind(order.send_error.clone())
        .bind(order.next_send_at)
        .execute(executor)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(order.order_id.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: Order) -> StoreResult<Order> {
        let sql = format!(
            "INSERT INTO orders (order_id, input, status, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(&order.order_id)
            .bind(&order.input)
            .bind(order.status.as_str())
            .bind(order.created_at)
            .fetch_one(&self.pool)
            .await?;
        let stored = Self::decode(&row)?;
        debug!(order_id = %stored.order_id, id = stored.id, "order stored");
        Ok(stored)
    }

    async fn get(&self, order_id: &str) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE order_id = $1", COLUMNS);
        let row = sqlx::query(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::decode).transpose()
    }

    async fn purge_interrupted(&self) -> StoreResult<u64> {
        let purged = sqlx::query(
            "UPDATE orders SET \
                precheck_passed = FALSE, precheck_error = NULL, precheck_result = NULL, \
                last_prechecked_at = NULL, started_at = NULL, status = 'queued' \
             WHERE precheck_passed AND started_at IS NOT NULL AND processed_at IS NULL",
        )
        .execute(&self.pool)
        .await?;
        Ok(purged.rows_affected())
    }

    async fn fetch_unchecked(
        &self,
        limit: usize,
        recheck_before: Timestamp,
    ) -> StoreResult<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders \
             WHERE status = 'queued' AND NOT precheck_passed AND precheck_error IS NULL \
               AND started_at IS NULL \
               AND (last_prechecked_at IS NULL OR last_prechecked_at <= $1) \
             ORDER BY created_at, id LIMIT $2",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(recheck_before)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn update(&self, order: &Order) -> StoreResult<()> {
        Self::write_one(&self.pool, order).await
    }

    async fn fetch_deliverable(&self, limit: usize, now: Timestamp) -> StoreResult<Vec<Order>> {
        let sql = format!(
            "SELECT {} FROM orders \
             WHERE status = 'processed' AND sent_at IS NULL \
               AND (next_send_at IS NULL OR next_send_at <= $1) \
             ORDER BY send_tries, id LIMIT $2",
            COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::decode).collect()
    }

    async fn update_batch(&self, orders: &[Order]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        for order in orders {
            Self::write_one(&mut *tx, order).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn requeue(&self, order_id: &OrderId) -> StoreResult<Order> {
        let sql = format!(
            "UPDATE orders SET \
                status = 'queued', precheck_result = NULL, precheck_passed = FALSE, \
                precheck_error = NULL, last_prechecked_at = NULL, started_at = NULL, \
                result = NULL, dose_adjusted = FALSE, process_error = NULL, processed_at = NULL, \
                sent_at = NULL, send_tries = 0, last_send_attempt_at = NULL, send_error = NULL, \
                next_send_at = NULL \
             WHERE order_id = $1 RETURNING {}",
            COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(order_id.clone()))?;
        Self::decode(&row)
    }
}
