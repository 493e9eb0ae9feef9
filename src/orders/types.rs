/*!
 * Order Types
 * The persisted unit of work and its lifecycle transitions
 */

use crate::core::errors::{Classify, ErrorClass};
use crate::core::types::{OrderId, RowId, Timestamp};
use chrono::Duration as ChronoDuration;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Storage operation result
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum StoreError {
    #[error("Order not found: {0}")]
    #[diagnostic(
        code(store::not_found),
        help("The order may have been deleted or the identifier is wrong.")
    )]
    NotFound(String),

    #[error("Database error: {0}")]
    #[diagnostic(
        code(store::database),
        help("Check database connectivity; the operation can be retried.")
    )]
    Database(String),

    #[error("Corrupt row: {0}")]
    #[diagnostic(
        code(store::decode),
        help("A persisted column holds a value the pipeline does not understand.")
    )]
    Decode(String),
}

impl Classify for StoreError {
    fn class(&self) -> ErrorClass {
        match self {
            StoreError::Database(_) => ErrorClass::Recoverable,
            StoreError::NotFound(_) | StoreError::Decode(_) => ErrorClass::Internal,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Decode(err.to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Order status as persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Waiting for the precheck (or re-queued)
    Queued,
    /// Simulation launched
    Processing,
    /// Artifact ready, not yet delivered
    Processed,
    /// Terminal failure with a message on the order
    Error,
    /// Delivered downstream
    Sent,
    /// Delivery attempts exhausted
    SendFailed,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Queued => "queued",
            OrderStatus::Processing => "processing",
            OrderStatus::Processed => "processed",
            OrderStatus::Error => "error",
            OrderStatus::Sent => "sent",
            OrderStatus::SendFailed => "send_failed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(OrderStatus::Queued),
            "processing" => Ok(OrderStatus::Processing),
            "processed" => Ok(OrderStatus::Processed),
            "error" => Ok(OrderStatus::Error),
            "sent" => Ok(OrderStatus::Sent),
            "send_failed" => Ok(OrderStatus::SendFailed),
            other => Err(StoreError::Decode(format!("unknown order status '{}'", other))),
        }
    }
}

/// A dose-adjustment order
///
/// Field groups follow the lifecycle: precheck, processing, delivery. Every
/// mutation goes through one of the transition methods below so the stores and
/// the pipeline agree on which fields move together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: RowId,
    pub order_id: OrderId,
    /// Original submission, verbatim
    pub input: String,
    pub status: OrderStatus,
    pub created_at: Timestamp,

    pub precheck_result: Option<serde_json::Value>,
    pub precheck_passed: bool,
    pub precheck_error: Option<String>,
    pub last_prechecked_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,

    /// Base64 artifact written by the simulation script
    pub result: Option<String>,
    pub dose_adjusted: bool,
    pub process_error: Option<String>,
    /// Completion of the simulation
    pub processed_at: Option<Timestamp>,

    pub sent_at: Option<Timestamp>,
    pub send_tries: i32,
    pub last_send_attempt_at: Option<Timestamp>,
    pub send_error: Option<String>,
    pub next_send_at: Option<Timestamp>,
}

impl Order {
    /// Create a queued order for a raw submission
    pub fn new(input: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            id: 0,
            order_id: Uuid::new_v4().to_string(),
            input: input.into(),
            status: OrderStatus::Queued,
            created_at,
            precheck_result: None,
            precheck_passed: false,
            precheck_error: None,
            last_prechecked_at: None,
            started_at: None,
            result: None,
            dose_adjusted: false,
            process_error: None,
            processed_at: None,
            sent_at: None,
            send_tries: 0,
            last_send_attempt_at: None,
            send_error: None,
            next_send_at: None,
        }
    }

    // -------------------------------------------------------------------------
    // Precheck
    // -------------------------------------------------------------------------

    /// Not yet prechecked and not waiting out a recheck delay
    pub fn is_unchecked(&self, recheck_before: Timestamp) -> bool {
        self.status == OrderStatus::Queued
            && !self.precheck_passed
            && self.precheck_error.is_none()
            && self.started_at.is_none()
            && self
                .last_prechecked_at
                .map_or(true, |at| at <= recheck_before)
    }

    /// Simulation launched after a passed precheck but never completed
    pub fn is_interrupted(&self) -> bool {
        self.precheck_passed && self.started_at.is_some() && self.processed_at.is_none()
    }

    /// Return the order to the unchecked pool
    pub fn reset_precheck(&mut self) {
        self.precheck_passed = false;
        self.precheck_error = None;
        self.precheck_result = None;
        self.last_prechecked_at = None;
        self.started_at = None;
        self.status = OrderStatus::Queued;
    }

    /// Precheck passed; the simulation is launched right after persisting
    pub fn mark_precheck_passed(&mut self, result: serde_json::Value, at: Timestamp) {
        self.precheck_passed = true;
        self.precheck_error = None;
        self.precheck_result = Some(result);
        self.last_prechecked_at = Some(at);
        self.started_at = Some(at);
        self.status = OrderStatus::Processing;
    }

    /// Precheck failed on the input; the simulation still runs to produce an
    /// explanatory artifact
    pub fn mark_precheck_rejected(
        &mut self,
        message: impl Into<String>,
        partial: Option<serde_json::Value>,
        at: Timestamp,
    ) {
        self.precheck_passed = false;
        self.precheck_error = Some(message.into());
        self.precheck_result = partial;
        self.last_prechecked_at = Some(at);
        self.started_at = Some(at);
        self.status = OrderStatus::Processing;
    }

    /// Precheck hit an infrastructure fault; stays unchecked
    pub fn mark_precheck_deferred(&mut self, at: Timestamp) {
        self.last_prechecked_at = Some(at);
    }

    // -------------------------------------------------------------------------
    // Processing
    // -------------------------------------------------------------------------

    pub fn mark_processed(&mut self, dose_adjusted: bool, at: Timestamp) {
        self.dose_adjusted = dose_adjusted;
        self.process_error = None;
        self.processed_at = Some(at);
        self.status = OrderStatus::Processed;
    }

    pub fn mark_process_failed(&mut self, message: impl Into<String>, at: Timestamp) {
        self.dose_adjusted = false;
        self.process_error = Some(message.into());
        self.processed_at = Some(at);
        self.status = OrderStatus::Error;
    }

    // -------------------------------------------------------------------------
    // Delivery
    // -------------------------------------------------------------------------

    /// Ready for upload at `now`
    pub fn is_deliverable(&self, now: Timestamp) -> bool {
        self.status == OrderStatus::Processed
            && self.sent_at.is_none()
            && self.next_send_at.map_or(true, |at| at <= now)
    }

    /// Missing or corrupt artifact; terminal
    pub fn mark_artifact_invalid(&mut self, message: impl Into<String>) {
        self.process_error = Some(message.into());
        self.status = OrderStatus::Error;
    }

    /// Must be called immediately before every upload
    pub fn record_send_attempt(&mut self, at: Timestamp) {
        self.send_tries += 1;
        self.last_send_attempt_at = Some(at);
    }

    pub fn mark_sent(&mut self, at: Timestamp) {
        self.sent_at = Some(at);
        self.send_error = None;
        self.next_send_at = None;
        self.status = OrderStatus::Sent;
    }

    /// Record an upload failure; parks the order once `max_tries` is reached
    pub fn mark_send_failed(
        &mut self,
        error: impl Into<String>,
        now: Timestamp,
        backoff: Duration,
        max_backoff: Duration,
        max_tries: i32,
    ) {
        self.send_error = Some(error.into());
        if self.send_tries >= max_tries {
            self.next_send_at = None;
            self.status = OrderStatus::SendFailed;
            return;
        }

        let exponent = self.send_tries.saturating_sub(1).clamp(0, 16) as u32;
        let delay = backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(max_backoff)
            .min(max_backoff);
        self.next_send_at = ChronoDuration::from_std(delay)
            .ok()
            .map(|d| now + d);
    }

    /// Clear the whole downstream chain and queue the order again
    pub fn requeue(&mut self) {
        self.reset_precheck();
        self.result = None;
        self.dose_adjusted = false;
        self.process_error = None;
        self.processed_at = None;
        self.sent_at = None;
        self.send_tries = 0;
        self.last_send_attempt_at = None;
        self.send_error = None;
        self.next_send_at = None;
    }
}
