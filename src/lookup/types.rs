/*!
 * Lookup Types
 * Wire shapes and errors of the compound service and the document store
 */

use crate::core::errors::{Classify, ErrorClass};
use crate::orders::Sex;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lookup operation result
pub type LookupResult<T> = Result<T, LookupError>;

/// Errors from the external lookup services
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum LookupError {
    #[error("Not found: {0}")]
    #[diagnostic(
        code(lookup::not_found),
        help("The requested entry is not part of the service vocabulary.")
    )]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    #[diagnostic(
        code(lookup::unauthorized),
        help("Check the service credentials; the token will be requested again.")
    )]
    Unauthorized(String),

    #[error("Service returned HTTP {status}: {body}")]
    #[diagnostic(code(lookup::status), help("The service is failing; retry later."))]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    #[diagnostic(
        code(lookup::transport),
        help("Network communication failed. Check connectivity.")
    )]
    Transport(String),

    #[error("Unexpected response: {0}")]
    #[diagnostic(
        code(lookup::decode),
        help("The service answered with a payload that could not be decoded.")
    )]
    Decode(String),
}

impl LookupError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, LookupError::NotFound(_))
    }
}

impl Classify for LookupError {
    fn class(&self) -> ErrorClass {
        match self {
            LookupError::NotFound(_) => ErrorClass::Unrecoverable,
            _ => ErrorClass::Recoverable,
        }
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LookupError::Decode(err.to_string())
        } else {
            LookupError::Transport(err.to_string())
        }
    }
}

/// Token grant returned by login and refresh endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires
    pub expires_in: u64,
    /// Seconds until the refresh token expires
    #[serde(default)]
    pub refresh_expires_in: Option<u64>,
}

/// Synonyms known for one queried compound name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynonymMatch {
    pub name: String,
    #[serde(default)]
    pub matches: Vec<String>,
}

/// Pairwise drug-drug interaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub left: String,
    pub right: String,
    #[serde(default)]
    pub plausibility: Option<String>,
    #[serde(default)]
    pub relevance: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub credibility: Option<String>,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub doses: Vec<serde_json::Value>,
}

impl Interaction {
    /// The compound on the other side of `name`, if `name` takes part
    pub fn opponent_of(&self, name: &str) -> Option<&str> {
        if self.left.eq_ignore_ascii_case(name) {
            Some(&self.right)
        } else if self.right.eq_ignore_ascii_case(name) {
            Some(&self.left)
        } else {
            None
        }
    }
}

/// Equality query against the virtual-individual catalogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndividualQuery {
    pub population: String,
    pub sex: Sex,
    pub age: u32,
    /// Centimetres, rounded
    pub height: i64,
    /// Kilograms, rounded
    pub weight: i64,
}

/// `null`, `[]` and `{}` all mean "no document"
pub fn is_empty_document(document: &serde_json::Value) -> bool {
    match document {
        serde_json::Value::Null => true,
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}
