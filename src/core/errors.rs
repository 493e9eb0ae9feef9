/*!
 * Error Types
 * Failure classification shared by every pipeline stage, plus the unified
 * error surfaced by the binary
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::dispatch::DeliveryError;
pub use crate::lookup::LookupError;
pub use crate::orders::StoreError;
pub use crate::precheck::PrecheckError;
pub use crate::process::ProcessError;

/// How a failure should be treated by the layer that observes it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Infrastructure or transient fault; retry later, record nothing permanent
    Recoverable,
    /// Input or data fault; terminal for this attempt and recorded on the order
    Unrecoverable,
    /// External process exceeded its wall-clock budget
    Timeout,
    /// Decode or I/O fault inside the pipeline; terminal, never retried
    Internal,
}

impl ErrorClass {
    #[inline]
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::Recoverable | ErrorClass::Timeout)
    }
}

/// Implemented by every module error so callers can branch on the class
/// without matching on concrete variants
pub trait Classify {
    fn class(&self) -> ErrorClass;
}

/// Unified error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum DoseError {
    #[error("Configuration error: {0}")]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error("Lookup error: {0}")]
    #[diagnostic(transparent)]
    Lookup(#[from] LookupError),

    #[error("Precheck error: {0}")]
    #[diagnostic(transparent)]
    Precheck(#[from] PrecheckError),

    #[error("Process error: {0}")]
    #[diagnostic(transparent)]
    Process(#[from] ProcessError),

    #[error("Delivery error: {0}")]
    #[diagnostic(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("I/O error: {0}")]
    #[diagnostic(
        code(dose::io_error),
        help("Filesystem or I/O operation failed. Check paths and permissions.")
    )]
    Io(String),
}

impl From<std::io::Error> for DoseError {
    fn from(err: std::io::Error) -> Self {
        DoseError::Io(err.to_string())
    }
}

impl Classify for DoseError {
    fn class(&self) -> ErrorClass {
        match self {
            DoseError::Config(e) => e.class(),
            DoseError::Store(e) => e.class(),
            DoseError::Lookup(e) => e.class(),
            DoseError::Precheck(e) => e.class(),
            DoseError::Process(e) => e.class(),
            DoseError::Delivery(e) => e.class(),
            DoseError::Io(_) => ErrorClass::Internal,
        }
    }
}
