/// Best-effort scanning of other processes' memory maps.
///
/// Enumerating /proc is inherently racy: processes vanish between the
/// shell's glob expansion and grep's read. Those partial failures are
/// expected and tolerated; the tolerance rules live in a policy table,
/// not scattered string matching.
use log::error;

use crate::error::{ProfboxError, Result};
use crate::exec::supervisor::{run_process, RunOptions};
use crate::exec::ExitKind;

struct ToleratedScanError {
    prefix: &'static str,
    suffix: &'static str,
}

/// grep stderr produced when a process exits mid-scan.
const TOLERATED_SCAN_ERRORS: &[ToleratedScanError] = &[
    ToleratedScanError {
        prefix: "grep: /proc/",
        suffix: "/maps: No such file or directory",
    },
    ToleratedScanError {
        prefix: "grep: /proc/",
        suffix: "/maps: No such process",
    },
];

fn is_tolerated_scan_error(line: &str) -> bool {
    TOLERATED_SCAN_ERRORS
        .iter()
        .any(|rule| line.starts_with(rule.prefix) && line.ends_with(rule.suffix))
}

fn unexpected_error_lines(stderr: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(stderr)
        .lines()
        .filter(|line| !line.is_empty() && !is_tolerated_scan_error(line))
        .map(str::to_string)
        .collect()
}

/// Find pids whose memory maps match `pattern` (a perl-style regex).
///
/// Much faster than walking every process's maps in-process. Processes
/// that exited mid-scan are silently skipped.
pub fn pgrep_maps(pattern: &str) -> Result<Vec<i32>> {
    let outcome = run_process(
        vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("grep -lP '{}' /proc/*/maps", pattern),
        ],
        None,
        RunOptions {
            check: false,
            suppress_log: true,
            ..Default::default()
        },
    )?;

    // 0 = found, 1 = no match, 2 = read errors (racing exits). Anything
    // else means grep itself was killed or misused.
    match outcome.status {
        ExitKind::Exited(0 | 1 | 2) => {}
        status => {
            return Err(ProfboxError::Process(format!(
                "unexpected 'grep' exit {:?}, stdout {:?} stderr {:?}",
                status,
                outcome.stdout_str(),
                outcome.stderr_str()
            )))
        }
    }

    let unexpected = unexpected_error_lines(&outcome.stderr);
    if !unexpected.is_empty() {
        error!(
            "Unexpected 'grep' error output (first 10 lines): {:?}",
            &unexpected[..unexpected.len().min(10)]
        );
    }

    let mut pids = Vec::new();
    for line in String::from_utf8_lossy(&outcome.stdout).lines() {
        let pid = line
            .strip_prefix("/proc/")
            .and_then(|rest| rest.strip_suffix("/maps"))
            .and_then(|pid| pid.parse::<i32>().ok());
        match pid {
            Some(pid) => pids.push(pid),
            None => {
                return Err(ProfboxError::Process(format!(
                    "unexpected 'grep' line: {:?}",
                    line
                )))
            }
        }
    }
    Ok(pids)
}
