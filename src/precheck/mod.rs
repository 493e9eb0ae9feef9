/*!
 * Precheck
 * Safety gate between a queued order and its simulation
 */

pub mod models;
pub mod pipeline;
pub mod schedule;
pub mod types;

// Re-export public API
pub use models::ModelCatalog;
pub use pipeline::PrecheckPipeline;
pub use schedule::{expand_schedule, midnight_of, parse_intake_cron};
pub use types::{Compound, PrecheckError, PrecheckFailure, PrecheckResult, ScheduledDose};
