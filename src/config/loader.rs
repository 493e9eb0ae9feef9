/*!
 * Configuration Loader
 * Layered sources: defaults, per-environment file, environment variables
 */

use super::types::{AppConfig, ConfigError};
use ::config::{Config, Environment, File};
use tracing::info;

/// Environment variable selecting `config/<env>.toml`
pub const ENV_SELECTOR: &str = "DOSE_ENV";

/// Prefix of overriding environment variables, e.g. `DOSE_DATABASE__URL`
pub const ENV_PREFIX: &str = "DOSE";

/// Load `.env`, then `config/default.toml`, `config/$DOSE_ENV.toml` and
/// `DOSE_*` variables, in increasing priority
pub fn load() -> Result<AppConfig, ConfigError> {
    dotenv::dotenv().ok();
    let env = std::env::var(ENV_SELECTOR).unwrap_or_else(|_| "development".into());
    load_from("config", &env)
}

/// Load from an explicit configuration directory
pub fn load_from(dir: &str, env: &str) -> Result<AppConfig, ConfigError> {
    let settings = Config::builder()
        .add_source(File::with_name(&format!("{}/default", dir)).required(false))
        .add_source(File::with_name(&format!("{}/{}", dir, env)).required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| ConfigError::Load(e.to_string()))?;

    let config: AppConfig = settings
        .try_deserialize()
        .map_err(|e| ConfigError::Load(e.to_string()))?;
    config.validate()?;

    info!(
        env,
        workers = config.scheduler.workers,
        models = config.precheck.models.len(),
        "Configuration loaded"
    );
    Ok(config)
}
