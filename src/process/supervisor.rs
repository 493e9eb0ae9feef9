/*!
 * Process Tree Supervisors
 * Per-platform tree teardown behind [`ProcessSupervisor`]
 */

use super::traits::{ProcessSupervisor, TreeHandle};
use super::types::ProcessResult;
#[cfg(unix)]
use crate::core::limits::PROCESS_TAG_ENV;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, warn};

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{kill, killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid as NixPid;

/// Supervisor for the current platform
pub fn platform_supervisor() -> Arc<dyn ProcessSupervisor> {
    #[cfg(unix)]
    {
        Arc::new(GroupSupervisor)
    }
    #[cfg(not(unix))]
    {
        Arc::new(FallbackSupervisor)
    }
}

/// Puts the child in its own process group and kills the group. On Linux it
/// also kills every descendant that left the group and every process still
/// carrying the run's tag, which covers orphans re-parented to init.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupSupervisor;

#[cfg(unix)]
impl ProcessSupervisor for GroupSupervisor {
    fn prepare(&self, command: &mut Command, tag: &str) {
        command.process_group(0).env(PROCESS_TAG_ENV, tag);
    }

    fn attach(&self, os_pid: u32, tag: &str) -> TreeHandle {
        TreeHandle {
            pid: os_pid,
            group: Some(os_pid as i32),
            tag: Some(tag.to_string()),
        }
    }

    fn terminate(&self, handle: &TreeHandle) -> ProcessResult<()> {
        // Walk the tree only while the root is still ours; a reaped pid may
        // already belong to someone else
        let root_is_ours = handle
            .tag
            .as_deref()
            .map_or(true, |tag| carries_tag(handle.pid, tag));
        let mut stragglers = if root_is_ours {
            descendants(handle.pid)
        } else {
            Vec::new()
        };
        if let Some(ref tag) = handle.tag {
            for pid in tagged_processes(tag) {
                if pid != handle.pid && !stragglers.contains(&pid) {
                    stragglers.push(pid);
                }
            }
        }

        if let Some(group) = handle.group {
            match killpg(NixPid::from_raw(group), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!(group, error = %e, "Failed to kill process group"),
            }
        }

        for pid in stragglers {
            match kill(NixPid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) => debug!(pid, "Killed detached process"),
                Err(Errno::ESRCH) => {}
                Err(e) => warn!(pid, error = %e, "Failed to kill detached process"),
            }
        }
        Ok(())
    }
}

/// Every other process whose environment holds `PROCESS_TAG_ENV=<tag>`
#[cfg(target_os = "linux")]
pub fn tagged_processes(tag: &str) -> Vec<u32> {
    let own = std::process::id();
    let entries = match std::fs::read_dir("/proc") {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Cannot scan /proc for tagged processes");
            return Vec::new();
        }
    };

    entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter(|&pid| pid != own && carries_tag(pid, tag))
        .collect()
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn tagged_processes(_tag: &str) -> Vec<u32> {
    Vec::new()
}

/// Unreadable environments (other users, zombies) never match
#[cfg(target_os = "linux")]
fn carries_tag(pid: u32, tag: &str) -> bool {
    std::fs::read(format!("/proc/{}/environ", pid))
        .map_or(false, |environ| environ_has_tag(&environ, tag))
}

#[cfg(all(unix, not(target_os = "linux")))]
fn carries_tag(_pid: u32, _tag: &str) -> bool {
    true
}

/// `environ` is the NUL-separated `KEY=value` list from `/proc/<pid>/environ`
#[cfg(target_os = "linux")]
fn environ_has_tag(environ: &[u8], tag: &str) -> bool {
    let marker = format!("{}={}", PROCESS_TAG_ENV, tag);
    environ
        .split(|&b| b == 0)
        .any(|entry| entry == marker.as_bytes())
}

/// Every transitive child of `root`, from `/proc/<pid>/stat`
#[cfg(target_os = "linux")]
pub fn descendants(root: u32) -> Vec<u32> {
    use std::collections::HashMap;

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    let entries = match std::fs::read_dir("/proc") {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Cannot scan /proc for descendants");
            return Vec::new();
        }
    };

    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        if let Some(ppid) = parent_of(&stat) {
            children.entry(ppid).or_default().push(pid);
        }
    }

    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(pid) = stack.pop() {
        if let Some(kids) = children.get(&pid) {
            for &kid in kids {
                found.push(kid);
                stack.push(kid);
            }
        }
    }
    found
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn descendants(_root: u32) -> Vec<u32> {
    Vec::new()
}

/// Parent pid from a `/proc/<pid>/stat` line; the command name may contain
/// spaces and parentheses, so parse after the last `)`
#[cfg(target_os = "linux")]
fn parent_of(stat: &str) -> Option<u32> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().nth(1)?.parse().ok()
}

/// Kills only the direct child; grandchildren may survive
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackSupervisor;

impl ProcessSupervisor for FallbackSupervisor {
    fn prepare(&self, _command: &mut Command, _tag: &str) {}

    fn attach(&self, os_pid: u32, _tag: &str) -> TreeHandle {
        TreeHandle {
            pid: os_pid,
            group: None,
            tag: None,
        }
    }

    fn terminate(&self, handle: &TreeHandle) -> ProcessResult<()> {
        warn!(
            pid = handle.pid,
            "Process tree teardown unsupported on this platform, killing the direct child only"
        );
        Ok(())
    }
}
