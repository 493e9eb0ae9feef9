/*!
 * Process Module
 * External simulation execution with process-tree supervision
 */

pub mod executor;
pub mod simulation;
pub mod supervisor;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use executor::ProcessExecutor;
pub use simulation::{SimulationJob, SimulationRunner, SimulationTrigger};
#[cfg(unix)]
pub use supervisor::GroupSupervisor;
pub use supervisor::{platform_supervisor, FallbackSupervisor};
pub use traits::{ProcessSupervisor, Simulator, TreeHandle};
pub use types::{ProcessError, ProcessResult, RunOutput, RunRequest, ScriptReport};
