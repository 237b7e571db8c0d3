/// Process introspection through /proc/<pid>/status.
use std::fs;

use crate::error::{ProfboxError, Result};

fn read_status(pid: i32) -> Result<String> {
    Ok(fs::read_to_string(format!("/proc/{}/status", pid))?)
}

/// Kernel-level name of a process (its comm), from the first status line.
pub fn process_comm(pid: i32) -> Result<String> {
    let status = read_status(pid)?;
    let name_line = status.lines().next().unwrap_or_default();
    match name_line.strip_prefix("Name:\t") {
        Some(name) => Ok(name.to_string()),
        None => Err(ProfboxError::Process(format!(
            "malformed name line in /proc/{}/status: {:?}",
            pid, name_line
        ))),
    }
}

/// The pid of a process as seen from inside its own pid namespace: the
/// last field of the `NSpid:` status line.
///
/// Kernels before 4.1 do not expose `NSpid:`; that degrades to `Ok(None)`.
pub fn process_nspid(pid: i32) -> Result<Option<i32>> {
    let status = read_status(pid)?;
    for line in status.lines() {
        let mut fields = line.split_whitespace();
        if fields.next() != Some("NSpid:") {
            continue;
        }
        return match fields.last().and_then(|field| field.parse().ok()) {
            Some(nspid) => Ok(Some(nspid)),
            None => Err(ProfboxError::Process(format!(
                "malformed NSpid line in /proc/{}/status: {:?}",
                pid, line
            ))),
        };
    }
    Ok(None)
}

/// Whether we run in the init pid namespace.
///
/// Checked via pid 2: in the init namespace it is always kthreadd, the
/// parent of all kernel threads, and it is not visible anywhere else.
pub fn is_running_in_init_pid_ns() -> bool {
    matches!(process_comm(2), Ok(comm) if comm == "kthreadd")
}
