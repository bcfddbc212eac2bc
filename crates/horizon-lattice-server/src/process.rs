//! Client process control.
//!
//! The server needs two things from the operating system: whether a client
//! process is still alive (health monitoring) and a way to kill one that will
//! not quit (shutdown escalation). Both go through [`ProcessControl`] so tests
//! can substitute a fake.

use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use crate::error::ProcessError;

/// Operating system process identifier of a client.
pub type ProcessId = u32;

/// Liveness queries and forced termination for client processes.
///
/// Implementations must not block: the health monitor calls
/// [`is_alive`](Self::is_alive) for every session while holding the registry.
pub trait ProcessControl: Send + Sync {
    /// Whether the process still exists.
    fn is_alive(&self, pid: ProcessId) -> bool;

    /// Forcibly terminate the process.
    fn kill(&self, pid: ProcessId) -> Result<(), ProcessError>;
}

/// [`ProcessControl`] backed by the host's process table.
pub struct SystemProcesses {
    system: Mutex<System>,
}

impl SystemProcesses {
    /// Create an empty process snapshot; entries are refreshed on demand.
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn refresh(system: &mut System, pid: Pid) {
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing(),
        );
    }
}

impl Default for SystemProcesses {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessControl for SystemProcesses {
    fn is_alive(&self, pid: ProcessId) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = self.system.lock();
        Self::refresh(&mut system, pid);
        system.process(pid).is_some()
    }

    fn kill(&self, pid: ProcessId) -> Result<(), ProcessError> {
        let sys_pid = Pid::from_u32(pid);
        let mut system = self.system.lock();
        Self::refresh(&mut system, sys_pid);
        let process = system.process(sys_pid).ok_or(ProcessError::NotFound(pid))?;
        if process.kill() {
            Ok(())
        } else {
            Err(ProcessError::KillFailed(pid))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_alive() {
        let processes = SystemProcesses::new();
        assert!(processes.is_alive(std::process::id()));
    }

    #[test]
    fn test_kill_missing_process() {
        let processes = SystemProcesses::new();
        // Pid values this large are never handed out on supported platforms.
        let pid = u32::MAX - 7;
        assert!(!processes.is_alive(pid));
        assert_eq!(processes.kill(pid), Err(ProcessError::NotFound(pid)));
    }
}
