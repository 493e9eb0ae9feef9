/*!
 * Configuration
 * Typed settings for every pipeline component
 */

mod loader;
mod types;

pub use loader::{load, load_from, ENV_PREFIX, ENV_SELECTOR};
pub use types::{
    AppConfig, CompoundServiceConfig, ConfigError, DatabaseConfig, DeliveryConfig,
    DeliveryVariant, DispatchConfig, IndividualStoreConfig, ModelSpec, PrecheckConfig,
    SchedulerConfig, SimulationConfig,
};
