//! Small process-related helpers shared across the workspace.
//!
//! Covers the three child-process concerns the recorder needs: spawning
//! detached children that outlive the parent, probing whether a previously
//! recorded pid still maps to a live OS process, and terminating a process
//! by pid.

use std::ffi::OsStr;

use sysinfo::{Pid, ProcessesToUpdate, Signal, System};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

impl NoWindowExt for std::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Detach a child from the parent's lifetime.
///
/// On Unix the child is placed in its own process group so it survives the
/// parent exiting and is not reached by terminal signals sent to the
/// parent's group. On Windows the no-window flag already detaches from the
/// console.
pub trait DetachExt {
    fn detached(&mut self);
}

impl DetachExt for std::process::Command {
    fn detached(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            self.process_group(0);
        }
        self.no_window();
    }
}

/// Create a `std::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
pub fn std_command(program: impl AsRef<OsStr>) -> std::process::Command {
    let mut cmd = std::process::Command::new(program);
    cmd.no_window();
    cmd
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

#[cfg(feature = "tokio")]
impl DetachExt for tokio::process::Command {
    fn detached(&mut self) {
        self.as_std_mut().detached();
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

/// Create a detached `tokio::process::Command` (own process group, no window).
#[cfg(feature = "tokio")]
pub fn detached_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.detached();
    cmd
}

/// Zero-signal liveness probe for a pid.
///
/// Returns `true` while the process table has an entry for `pid`. The probe
/// never distinguishes "no permission" from "alive" — callers that clear
/// persisted state should only act on a definitive `false`.
pub fn process_exists(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).is_some()
}

/// Ask a process to terminate (SIGTERM on Unix, TerminateProcess on Windows).
///
/// Returns `false` when the process does not exist or the signal could not
/// be delivered.
pub fn terminate(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    match system.process(pid) {
        Some(process) => process
            .kill_with(Signal::Term)
            .unwrap_or_else(|| process.kill()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_is_alive() {
        assert!(process_exists(std::process::id()));
    }

    #[test]
    fn reaped_child_is_gone() {
        let mut child = std_command("true").spawn().expect("spawn true");
        let pid = child.id();
        child.wait().expect("wait");
        assert!(!process_exists(pid));
    }

    #[test]
    fn terminate_missing_pid_is_false() {
        // Spawn and reap a short-lived child, then signal its stale pid.
        let mut child = std_command("true").spawn().expect("spawn true");
        let pid = child.id();
        child.wait().expect("wait");
        assert!(!terminate(pid));
    }
}
