/*!
 * Process Types
 * Requests, outcomes and errors of the external simulation process
 */

use crate::core::errors::{Classify, ErrorClass};
use crate::core::types::OrderId;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Process operation result
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Process errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ProcessError {
    #[error("Spawn failed: {0}")]
    #[diagnostic(
        code(process::spawn_failed),
        help("Check simulation.command and simulation.script.")
    )]
    SpawnFailed(String),

    #[error("Pipe setup failed: {0}")]
    #[diagnostic(code(process::pipe_setup))]
    PipeSetup(String),

    #[error("Simulation exceeded its time budget of {0:?}")]
    #[diagnostic(
        code(process::timeout),
        help("The process tree was killed; the run is retried once without adjustment.")
    )]
    Timeout(Duration),

    #[error("Unreadable simulation output: {0}")]
    #[diagnostic(code(process::decode))]
    Decode(String),

    #[error("Simulation exited with {code:?}: {detail}")]
    #[diagnostic(code(process::exit), help("See the `simulation` log target for stderr."))]
    Exit { code: Option<i32>, detail: String },

    #[error("Simulation reported an error: {message}")]
    #[diagnostic(code(process::script))]
    Script {
        message: String,
        call_stack: Option<String>,
    },

    #[error("I/O error: {0}")]
    #[diagnostic(code(process::io))]
    Io(String),
}

impl ProcessError {
    /// Message recorded on the order when the run fails for good
    pub fn order_message(&self) -> String {
        match self {
            ProcessError::Script { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl Classify for ProcessError {
    fn class(&self) -> ErrorClass {
        match self {
            ProcessError::Timeout(_) => ErrorClass::Timeout,
            ProcessError::Script { .. } => ErrorClass::Unrecoverable,
            _ => ErrorClass::Internal,
        }
    }
}

impl From<std::io::Error> for ProcessError {
    fn from(err: std::io::Error) -> Self {
        ProcessError::Io(err.to_string())
    }
}

/// One invocation of the simulation script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub job_id: OrderId,
    /// Whether the script may adjust the dose
    pub adjust: bool,
    /// Explanation rendered into the artifact when `adjust` is false
    pub error_message: Option<String>,
    pub model_path: PathBuf,
    pub timeout: Duration,
}

impl RunRequest {
    /// Positional arguments after the script: id, flag, message, model
    pub fn args(&self) -> Vec<String> {
        vec![
            self.job_id.clone(),
            if self.adjust { "TRUE" } else { "FALSE" }.to_string(),
            self.error_message.clone().unwrap_or_default(),
            self.model_path.display().to_string(),
        ]
    }
}

/// Successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub dose_adjusted: bool,
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

/// Structured report the script prints on stdout
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScriptReport {
    #[serde(default)]
    pub dose_adjusted: bool,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub error_msg: Option<String>,
    /// String or array of frames, depending on how the script serialised it
    #[serde(default)]
    pub call_stack: Option<serde_json::Value>,
}

impl ScriptReport {
    /// Parse the whole output, or failing that its last non-empty line
    pub fn parse(stdout: &[u8]) -> Result<Self, serde_json::Error> {
        let text = String::from_utf8_lossy(stdout);
        serde_json::from_str(text.trim()).or_else(|err| {
            match text.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
                Some(last) => serde_json::from_str(last),
                None => Err(err),
            }
        })
    }

    pub fn call_stack_text(&self) -> Option<String> {
        match &self.call_stack {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Array(frames)) => Some(
                frames
                    .iter()
                    .map(|f| f.as_str().map_or_else(|| f.to_string(), str::to_string))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            Some(other) => Some(other.to_string()),
        }
    }
}
