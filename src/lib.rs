/*!
 * Dose Kernel Library
 * Asynchronous dose-adjustment pipeline exposed as a library
 */

pub mod config;
pub mod core;
pub mod dispatch;
pub mod lookup;
pub mod monitoring;
pub mod orders;
pub mod precheck;
pub mod process;
pub mod scheduler;

// Re-exports
pub use crate::config::AppConfig;
pub use crate::core::errors::{Classify, DoseError, ErrorClass};
pub use crate::core::types::{OrderId, Timestamp};
pub use dispatch::{ArtifactSink, DeliveryClient, ResultDispatcher};
pub use lookup::{CompoundClient, CompoundLookup, IndividualClient, IndividualLookup};
pub use monitoring::init_tracing;
pub use orders::{MemoryOrderStore, Order, OrderStatus, OrderStore, PatientData, PgOrderStore};
pub use precheck::{PrecheckPipeline, PrecheckResult};
pub use process::{ProcessExecutor, SimulationJob, SimulationRunner, SimulationTrigger};
pub use scheduler::JobScheduler;
