/*!
 * Process Executor
 * Spawns the simulation script, streams its stderr and enforces the deadline
 */

use super::traits::{ProcessSupervisor, Simulator, TreeHandle};
use super::types::*;
use crate::config::SimulationConfig;
use crate::core::types::absolute_path;
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Runs the configured interpreter/script under a [`ProcessSupervisor`]
pub struct ProcessExecutor {
    config: SimulationConfig,
    supervisor: Arc<dyn ProcessSupervisor>,
}

impl ProcessExecutor {
    pub fn new(config: SimulationConfig, supervisor: Arc<dyn ProcessSupervisor>) -> Self {
        info!(
            command = %config.command.display(),
            script = ?config.script,
            "Process executor initialized"
        );
        Self { config, supervisor }
    }

    /// Build the command line for `request`
    pub fn command(&self, request: &RunRequest) -> Command {
        let mut command = Command::new(&self.config.command);
        if let Some(ref script) = self.config.script {
            command.arg(absolute_path(script));
        }
        command.args(request.args());

        // Inherited environment plus storage credentials for the script
        command.envs(&self.config.env);

        if let Some(dir) = self.config.working_dir() {
            command.current_dir(absolute_path(dir));
        }

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    /// Run one simulation, killing the whole tree once `request.timeout` passes
    ///
    /// Processes the script leaves behind are killed when it exits, so a
    /// detached helper holding stdout cannot stall the run.
    #[instrument(skip(self, request), fields(job_id = %request.job_id, adjust = request.adjust))]
    pub async fn execute(&self, request: &RunRequest) -> ProcessResult<RunOutput> {
        let started = Instant::now();
        let tag = format!("{}-{}", request.job_id, Uuid::new_v4());
        let mut command = self.command(request);
        self.supervisor.prepare(&mut command, &tag);

        let mut child = command.spawn().map_err(|e| {
            ProcessError::SpawnFailed(format!("{}: {}", self.config.command.display(), e))
        })?;
        let os_pid = child
            .id()
            .ok_or_else(|| ProcessError::SpawnFailed("child exited before tracking".into()))?;
        let handle = self.supervisor.attach(os_pid, &tag);
        debug!(os_pid, "Simulation spawned");

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProcessError::PipeSetup("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProcessError::PipeSetup("stderr not captured".into()))?;

        let prefixes = self.config.suppressed_prefixes.clone();
        let job_id = request.job_id.clone();
        tokio::spawn(forward_stderr(stderr, prefixes, job_id));
        let reader = tokio::spawn(read_all(stdout));

        let completion = async {
            let status = child.wait().await?;
            // Leftovers may hold stdout open past the script's exit
            self.sweep(&handle);
            let stdout = reader
                .await
                .map_err(|e| ProcessError::Io(e.to_string()))??;
            Ok::<_, ProcessError>((status, stdout))
        };

        match tokio::time::timeout(request.timeout, completion).await {
            Ok(Ok((status, stdout))) => {
                let elapsed = started.elapsed();
                info!(
                    exit_code = ?status.code(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Simulation finished"
                );
                decode(&stdout, status, elapsed)
            }
            Ok(Err(e)) => {
                error!(error = %e, "Simulation I/O failed");
                Err(e)
            }
            Err(_) => {
                warn!(timeout = ?request.timeout, os_pid, "Simulation timed out, killing process tree");
                self.sweep(&handle);
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "Direct child already gone");
                }
                let _ = child.wait().await;
                Err(ProcessError::Timeout(request.timeout))
            }
        }
    }

    fn sweep(&self, handle: &TreeHandle) {
        if let Err(e) = self.supervisor.terminate(handle) {
            error!(error = %e, "Process tree teardown failed");
        }
    }
}

#[async_trait]
impl Simulator for ProcessExecutor {
    async fn run(&self, request: &RunRequest) -> ProcessResult<RunOutput> {
        self.execute(request).await
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut pipe: R) -> ProcessResult<Vec<u8>> {
    let mut buffer = Vec::new();
    pipe.read_to_end(&mut buffer).await?;
    Ok(buffer)
}

/// Forward stderr line by line under the `simulation` target
async fn forward_stderr<R: AsyncRead + Unpin>(pipe: R, suppressed: Vec<String>, job_id: String) {
    let mut lines = BufReader::new(pipe).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if is_suppressed(&line, &suppressed) {
                    continue;
                }
                info!(target: "simulation", job_id = %job_id, "{}", line);
            }
            Ok(None) => break,
            Err(e) => {
                debug!(target: "simulation", job_id = %job_id, error = %e, "stderr closed");
                break;
            }
        }
    }
}

fn is_suppressed(line: &str, prefixes: &[String]) -> bool {
    line.trim().is_empty() || prefixes.iter().any(|p| line.starts_with(p.as_str()))
}

fn decode(stdout: &[u8], status: ExitStatus, elapsed: std::time::Duration) -> ProcessResult<RunOutput> {
    match ScriptReport::parse(stdout) {
        Ok(report) if report.error => Err(ProcessError::Script {
            call_stack: report.call_stack_text(),
            message: report
                .error_msg
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "simulation failed without a message".to_string()),
        }),
        Ok(report) => Ok(RunOutput {
            dose_adjusted: report.dose_adjusted,
            exit_code: status.code(),
            elapsed,
        }),
        Err(e) if !status.success() => Err(ProcessError::Exit {
            code: status.code(),
            detail: e.to_string(),
        }),
        Err(e) => Err(ProcessError::Decode(e.to_string())),
    }
}
