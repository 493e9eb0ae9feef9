/*!
 * Process Traits
 * Seams around the external simulation process
 */

use super::types::*;
use async_trait::async_trait;
use tokio::process::Command;

/// Handle to a spawned process tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeHandle {
    /// OS pid of the direct child
    pub pid: u32,
    /// Process group led by the child, when the platform has one
    pub group: Option<i32>,
    /// Marker exported to every process of the run
    pub tag: Option<String>,
}

/// Platform capability for tearing down a whole process tree
pub trait ProcessSupervisor: Send + Sync {
    /// Adjust the command before spawn; `tag` is unique to this run
    fn prepare(&self, command: &mut Command, tag: &str);

    /// Track a freshly spawned child
    fn attach(&self, os_pid: u32, tag: &str) -> TreeHandle;

    /// Kill every process in the tree; the caller still reaps the child
    fn terminate(&self, handle: &TreeHandle) -> ProcessResult<()>;
}

/// Runs one simulation to completion
#[async_trait]
pub trait Simulator: Send + Sync {
    async fn run(&self, request: &RunRequest) -> ProcessResult<RunOutput>;
}
