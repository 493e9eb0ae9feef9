/*!
 * Dispatch Types
 * Delivery errors and per-tick dispatch accounting
 */

use crate::core::errors::{Classify, ErrorClass};
use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

/// Delivery operation result
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Delivery errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum DeliveryError {
    #[error("Delivery login rejected: {0}")]
    #[diagnostic(
        code(delivery::unauthorized),
        help("Check delivery.username and delivery.password.")
    )]
    Unauthorized(String),

    #[error("Delivery endpoint returned HTTP {status}: {body}")]
    #[diagnostic(code(delivery::status))]
    Status { status: u16, body: String },

    #[error("Upload rejected: {0}")]
    #[diagnostic(code(delivery::rejected))]
    Rejected(String),

    #[error("Transport error: {0}")]
    #[diagnostic(code(delivery::transport), help("Network communication failed."))]
    Transport(String),

    #[error("Unexpected delivery response: {0}")]
    #[diagnostic(code(delivery::decode))]
    Decode(String),

    #[error("Invalid artifact: {0}")]
    #[diagnostic(
        code(delivery::invalid_artifact),
        help("The simulation did not store a decodable artifact; requeue the order.")
    )]
    InvalidArtifact(String),
}

impl Classify for DeliveryError {
    fn class(&self) -> ErrorClass {
        match self {
            DeliveryError::InvalidArtifact(_) => ErrorClass::Unrecoverable,
            _ => ErrorClass::Recoverable,
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DeliveryError::Decode(err.to_string())
        } else {
            DeliveryError::Transport(err.to_string())
        }
    }
}

/// Outcome counts of one dispatch tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    pub invalid: usize,
}

impl DispatchReport {
    pub fn total(&self) -> usize {
        self.sent + self.failed + self.invalid
    }
}

/// `{status, data, message}` envelope
#[derive(Debug, Deserialize)]
pub(crate) struct JsendEnvelope<T> {
    pub status: String,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsendToken {
    pub token: String,
    pub expires_in: u64,
}

/// `{success, result, errors}` envelope
#[derive(Debug, Deserialize)]
pub(crate) struct VendorEnvelope<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub result: Option<T>,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

impl<T> VendorEnvelope<T> {
    pub fn error_text(&self) -> String {
        if self.errors.is_empty() {
            return "no reason given".to_string();
        }
        self.errors
            .iter()
            .map(|e| e.as_str().map_or_else(|| e.to_string(), str::to_string))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct VendorToken {
    pub access_token: String,
    pub expires_in: u64,
}
