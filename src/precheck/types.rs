/*!
 * Precheck Types
 * Stage outcome, classified errors and the persisted precheck result
 */

use crate::core::errors::{Classify, ErrorClass};
use crate::lookup::Interaction;
use chrono::{DateTime, FixedOffset};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Precheck errors, split by who has to act
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum PrecheckError {
    #[error("{0}")]
    #[diagnostic(
        code(precheck::recoverable),
        help("An external service failed; the order will be prechecked again.")
    )]
    Recoverable(String),

    #[error("{0}")]
    #[diagnostic(
        code(precheck::unrecoverable),
        help("The submission cannot be adjusted as entered.")
    )]
    Unrecoverable(String),
}

impl PrecheckError {
    pub fn recoverable(message: impl Into<String>) -> Self {
        PrecheckError::Recoverable(message.into())
    }

    pub fn unrecoverable(message: impl Into<String>) -> Self {
        PrecheckError::Unrecoverable(message.into())
    }

    pub fn cancelled() -> Self {
        Self::recoverable("precheck cancelled")
    }

    pub fn message(&self) -> &str {
        match self {
            PrecheckError::Recoverable(m) | PrecheckError::Unrecoverable(m) => m,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, PrecheckError::Recoverable(_))
    }
}

impl Classify for PrecheckError {
    fn class(&self) -> ErrorClass {
        match self {
            PrecheckError::Recoverable(_) => ErrorClass::Recoverable,
            PrecheckError::Unrecoverable(_) => ErrorClass::Unrecoverable,
        }
    }
}

/// One concrete intake of the adjusted drug
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledDose {
    pub at: DateTime<FixedOffset>,
    pub amount: f64,
    pub unit: Option<String>,
}

/// A compound of the submission after normalisation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Compound {
    /// Lowercased active substance
    pub name: String,
    pub synonyms: Vec<String>,
    pub adjust: bool,
    pub dose: Option<f64>,
    pub unit: Option<String>,
    /// Expanded intakes; only populated for the adjusted compound
    pub schedule: Vec<ScheduledDose>,
}

/// Everything the precheck learned, persisted as `precheck_result`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PrecheckResult {
    pub messages: Vec<String>,
    pub compounds: Vec<Compound>,
    pub interactions: Vec<Interaction>,
    pub organ_impairment: bool,
    pub individual: Option<serde_json::Value>,
    pub model_id: Option<String>,
}

impl PrecheckResult {
    /// The compound flagged for adjustment
    pub fn victim(&self) -> Option<&Compound> {
        self.compounds.iter().find(|c| c.adjust)
    }

    pub fn names(&self) -> Vec<String> {
        self.compounds.iter().map(|c| c.name.clone()).collect()
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A failed precheck with whatever the earlier stages produced
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{error}")]
pub struct PrecheckFailure {
    pub error: PrecheckError,
    pub partial: PrecheckResult,
}
