/*!
 * Configuration Types
 * One section per pipeline component; durations are given in seconds
 */

use crate::core::errors::{Classify, ErrorClass};
use crate::core::limits::*;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    #[diagnostic(
        code(config::load),
        help("Check config/default.toml and the DOSE_* environment variables.")
    )]
    Load(String),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(config::invalid), help("Review the named configuration value."))]
    Invalid(String),
}

impl Classify for ConfigError {
    fn class(&self) -> ErrorClass {
        ErrorClass::Internal
    }
}

/// Serde adapter for durations written as (fractional) seconds
pub(crate) mod secs {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(D::Error::custom(format!(
                "expected a non-negative number of seconds, got {}",
                secs
            )));
        }
        Ok(Duration::from_secs_f64(secs))
    }

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }
}

/// Full application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scheduler: SchedulerConfig,
    pub precheck: PrecheckConfig,
    pub compounds: CompoundServiceConfig,
    pub individuals: IndividualStoreConfig,
    pub simulation: SimulationConfig,
    pub dispatch: DispatchConfig,
    pub delivery: DeliveryConfig,
}

impl AppConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn require(ok: bool, what: &str) -> Result<(), ConfigError> {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::Invalid(what.to_string()))
            }
        }

        require(!self.database.url.is_empty(), "database.url must be set")?;
        require(self.database.max_connections > 0, "database.max_connections must be > 0")?;
        require(self.scheduler.workers > 0, "scheduler.workers must be > 0")?;
        require(
            !self.scheduler.poll_interval.is_zero(),
            "scheduler.poll_interval must be > 0",
        )?;
        require(self.precheck.max_doses > 0, "precheck.max_doses must be > 0")?;
        require(!self.simulation.timeout.is_zero(), "simulation.timeout must be > 0")?;
        require(
            self.simulation.max_concurrent > 0,
            "simulation.max_concurrent must be > 0",
        )?;
        require(self.dispatch.batch_size > 0, "dispatch.batch_size must be > 0")?;
        require(!self.dispatch.interval.is_zero(), "dispatch.interval must be > 0")?;
        require(self.dispatch.max_send_tries > 0, "dispatch.max_send_tries must be > 0")?;

        for model in &self.precheck.models {
            require(
                !model.id.is_empty() && !model.victim.is_empty(),
                "precheck.models entries need an id and a victim",
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    #[serde(with = "secs")]
    pub acquire_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub workers: usize,
    #[serde(with = "secs")]
    pub poll_interval: Duration,
    #[serde(with = "secs")]
    pub recheck_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_PRECHECK_WORKERS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            recheck_delay: DEFAULT_RECHECK_DELAY,
        }
    }
}

impl SchedulerConfig {
    pub fn queue_capacity(&self) -> usize {
        self.workers.max(1) * QUEUE_CAPACITY_FACTOR
    }
}

/// A PBPK model and the victim/perpetrator combination it covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: String,
    pub victim: String,
    #[serde(default)]
    pub perpetrators: Vec<String>,
    /// Model file; relative paths are resolved against the working directory
    pub path: PathBuf,
}

impl ModelSpec {
    /// Lowercased, de-duplicated, sorted perpetrator names
    pub fn perpetrator_key(&self) -> Vec<String> {
        let mut key: Vec<String> = self
            .perpetrators
            .iter()
            .map(|p| p.trim().to_lowercase())
            .collect();
        key.sort();
        key.dedup();
        key
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecheckConfig {
    pub max_doses: usize,
    pub default_population: String,
    pub models: Vec<ModelSpec>,
}

impl Default for PrecheckConfig {
    fn default() -> Self {
        Self {
            max_doses: DEFAULT_MAX_DOSES,
            default_population: DEFAULT_POPULATION.to_string(),
            models: Vec::new(),
        }
    }
}


#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompoundServiceConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    #[serde(with = "secs")]
    pub token_expiry_threshold: Duration,
    #[serde(with = "secs")]
    pub timeout: Duration,
}

impl Default for CompoundServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            username: String::new(),
            password: String::new(),
            token_expiry_threshold: DEFAULT_TOKEN_EXPIRY_THRESHOLD,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndividualStoreConfig {
    /// Data API root, e.g. `https://data.example.org/app/v1`
    pub base_url: String,
    /// Login endpoint exchanging the API key for a bearer token
    pub auth_url: String,
    pub api_key: String,
    pub data_source: String,
    pub database: String,
    pub collection: String,
    #[serde(with = "secs")]
    pub token_expiry_threshold: Duration,
    #[serde(with = "secs")]
    pub timeout: Duration,
}

impl Default for IndividualStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8082".to_string(),
            auth_url: "http://localhost:8082/auth/login".to_string(),
            api_key: String::new(),
            data_source: "default".to_string(),
            database: "pbpk".to_string(),
            collection: "virtual_individuals".to_string(),
            token_expiry_threshold: DEFAULT_TOKEN_EXPIRY_THRESHOLD,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Interpreter or executable, e.g. `Rscript`
    pub command: PathBuf,
    /// Script passed as first argument to `command`, if any
    pub script: Option<PathBuf>,
    #[serde(with = "secs")]
    pub timeout: Duration,
    pub max_concurrent: usize,
    /// stderr lines starting with any of these are not forwarded
    pub suppressed_prefixes: Vec<String>,
    /// Extra environment, typically storage credentials for the script
    pub env: BTreeMap<String, String>,
    /// Model handed to the script when no model was resolved
    pub fallback_model: PathBuf,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            command: PathBuf::from("Rscript"),
            script: None,
            timeout: DEFAULT_SIMULATION_TIMEOUT,
            max_concurrent: DEFAULT_MAX_CONCURRENT_SIMULATIONS,
            suppressed_prefixes: DEFAULT_SUPPRESSED_STDERR_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            env: BTreeMap::new(),
            fallback_model: PathBuf::from("models/fallback.pkml"),
        }
    }
}

impl SimulationConfig {
    /// Directory the external process runs in
    pub fn working_dir(&self) -> Option<&Path> {
        self.script
            .as_deref()
            .unwrap_or(&self.command)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    #[serde(with = "secs")]
    pub interval: Duration,
    pub batch_size: usize,
    pub max_send_tries: i32,
    #[serde(with = "secs")]
    pub retry_backoff: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_DISPATCH_INTERVAL,
            batch_size: DEFAULT_DISPATCH_BATCH,
            max_send_tries: DEFAULT_MAX_SEND_TRIES,
            retry_backoff: DEFAULT_SEND_RETRY_BACKOFF,
        }
    }
}

/// Login and response envelope spoken by the delivery endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryVariant {
    /// `{status, data, message}` envelopes
    #[default]
    Jsend,
    /// `{success, result, errors}` envelopes
    Vendor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Upload root; the order id is appended as last path segment
    pub endpoint: String,
    pub login_url: String,
    pub username: String,
    pub password: String,
    pub variant: DeliveryVariant,
    pub filename_prefix: String,
    #[serde(with = "secs")]
    pub token_expiry_threshold: Duration,
    #[serde(with = "secs")]
    pub timeout: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8083/orders".to_string(),
            login_url: "http://localhost:8083/login".to_string(),
            username: String::new(),
            password: String::new(),
            variant: DeliveryVariant::Jsend,
            filename_prefix: "dose_report_".to_string(),
            token_expiry_threshold: DEFAULT_TOKEN_EXPIRY_THRESHOLD,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}
