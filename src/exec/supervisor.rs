/// Supervised execution of profiler child processes.
///
/// The contract on every failure path (stop signal, timeout, wait error)
/// is terminate-then-reap BEFORE the condition propagates: a child never
/// outlives the `run_process` call that created it, and no path leaves a
/// zombie behind.
use std::io::{Read, Write};
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ExitStatus};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::debug;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};

use crate::error::{ProcessFailure, ProfboxError, Result};
use crate::event::{wait_event, StopSignal};
use crate::exec::spawn::{start_process, SpawnOptions};

/// Slice between completion polls while a stop signal is armed. The stop
/// wait itself is the blocking primitive, so shutdown latency is bounded
/// by the signal, not by this slice.
const RUN_POLL_SLICE: Duration = Duration::from_secs(1);

/// Slice between completion polls when only a timeout is armed.
const TIMEOUT_POLL_SLICE: Duration = Duration::from_millis(100);

/// How a child left: a normal exit code, or a terminating signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitKind {
    Exited(i32),
    Signaled(i32),
}

impl ExitKind {
    pub fn success(self) -> bool {
        matches!(self, ExitKind::Exited(0))
    }

    pub fn code(self) -> Option<i32> {
        match self {
            ExitKind::Exited(code) => Some(code),
            ExitKind::Signaled(_) => None,
        }
    }

    pub fn signal(self) -> Option<i32> {
        match self {
            ExitKind::Exited(_) => None,
            ExitKind::Signaled(signo) => Some(signo),
        }
    }

    fn from_status(status: ExitStatus) -> Self {
        match status.signal() {
            Some(signo) => ExitKind::Signaled(signo),
            // On unix a non-signaled wait status always carries a code.
            None => ExitKind::Exited(status.code().unwrap_or(0)),
        }
    }
}

/// Immutable record of one supervised run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub argv: Vec<String>,
    pub status: ExitKind,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ProcessOutcome {
    pub fn stdout_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub spawn: SpawnOptions,
    /// Fail the call when the child exits non-zero or dies on a signal.
    pub check: bool,
    /// Applies with or without a stop signal.
    pub timeout: Option<Duration>,
    /// Signal used when the child must be torn down.
    pub kill_signal: Signal,
    /// Bytes written to the child's stdin before waiting.
    pub stdin: Option<Vec<u8>>,
    /// Skip the captured-output debug logging (for noisy periodic scans).
    pub suppress_log: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            spawn: SpawnOptions::default(),
            check: true,
            timeout: None,
            kill_signal: Signal::SIGKILL,
            stdin: None,
            suppress_log: false,
        }
    }
}

/// Run a command to completion under cancellation/timeout supervision,
/// capturing its output.
///
/// With a stop signal, completion is polled in [`RUN_POLL_SLICE`] slices
/// interleaved with the signal wait; signal set raises
/// [`ProfboxError::Stopped`], deadline exceeded raises
/// [`ProfboxError::Timeout`]. Either way the child is killed with
/// `kill_signal` and reaped first.
pub fn run_process<I, S>(cmd: I, stop: Option<&StopSignal>, opts: RunOptions) -> Result<ProcessOutcome>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let RunOptions {
        spawn,
        check,
        timeout,
        kill_signal,
        stdin,
        suppress_log,
    } = opts;

    let argv: Vec<String> = cmd.into_iter().map(Into::into).collect();
    let mut child = start_process(argv.iter().cloned(), spawn)?;

    // Readers own the pipes from the moment of spawn, so a chatty child
    // can never fill a pipe and wedge the wait loop below.
    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let waited = match feed_stdin(&mut child, stdin.as_deref()) {
        Ok(()) => supervise(&mut child, stop, timeout),
        Err(err) => Err(err),
    };

    let status = match waited {
        Ok(status) => status,
        Err(err) => {
            // Terminate-then-reap, strictly in that order, before the
            // condition reaches the caller.
            let _ = signal::kill(Pid::from_raw(child.id() as i32), kill_signal);
            let _ = child.wait();
            let _ = stdout_reader.join();
            let _ = stderr_reader.join();
            return Err(err);
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();
    let outcome = ProcessOutcome {
        argv,
        status,
        stdout,
        stderr,
    };

    debug!("({}) exit: {:?}", outcome.argv.join(" "), outcome.status);
    if !suppress_log {
        if !outcome.stdout.is_empty() {
            debug!("({}) stdout: {}", outcome.argv.join(" "), outcome.stdout_str());
        }
        if !outcome.stderr.is_empty() {
            debug!("({}) stderr: {}", outcome.argv.join(" "), outcome.stderr_str());
        }
    }

    if check && !outcome.status.success() {
        return Err(ProcessFailure::from(outcome).into());
    }
    Ok(outcome)
}

/// Wait for an already-started child against a deadline and stop signal.
/// On `Stopped` or `Timeout` the child is killed and reaped before the
/// condition is returned.
pub fn poll_process(child: &mut Child, timeout: Duration, stop: &StopSignal) -> Result<()> {
    let waited = wait_event(timeout, stop, || matches!(child.try_wait(), Ok(Some(_))));
    if let Err(err) = waited {
        let _ = child.kill();
        let _ = child.wait();
        return Err(err);
    }
    Ok(())
}

fn drain<R>(stream: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            let _ = stream.read_to_end(&mut buf);
        }
        buf
    })
}

fn feed_stdin(child: &mut Child, input: Option<&[u8]>) -> Result<()> {
    // Taking the handle closes the stream when it drops, input or not.
    if let Some(mut pipe) = child.stdin.take() {
        if let Some(bytes) = input {
            if let Err(e) = pipe.write_all(bytes) {
                // The child may legitimately exit without reading its input.
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }
    }
    Ok(())
}

fn try_wait(child: &mut Child) -> Result<Option<ExitStatus>> {
    child
        .try_wait()
        .map_err(|e| ProfboxError::Process(format!("failed to poll child: {}", e)))
}

fn supervise(
    child: &mut Child,
    stop: Option<&StopSignal>,
    timeout: Option<Duration>,
) -> Result<ExitKind> {
    let stop = match stop {
        Some(stop) => stop,
        None => {
            let timeout = match timeout {
                Some(timeout) => timeout,
                None => {
                    let status = child
                        .wait()
                        .map_err(|e| ProfboxError::Process(format!("failed to wait for child: {}", e)))?;
                    return Ok(ExitKind::from_status(status));
                }
            };
            let deadline = Instant::now() + timeout;
            loop {
                if let Some(status) = try_wait(child)? {
                    return Ok(ExitKind::from_status(status));
                }
                if Instant::now() > deadline {
                    return Err(ProfboxError::Timeout(timeout));
                }
                thread::sleep(TIMEOUT_POLL_SLICE);
            }
        }
    };

    let deadline = timeout.map(|t| (Instant::now() + t, t));
    loop {
        if let Some(status) = try_wait(child)? {
            return Ok(ExitKind::from_status(status));
        }
        if stop.wait(RUN_POLL_SLICE) {
            return Err(ProfboxError::Stopped);
        }
        if let Some((deadline, timeout)) = deadline {
            if Instant::now() > deadline {
                return Err(ProfboxError::Timeout(timeout));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn no_check() -> RunOptions {
        RunOptions {
            check: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_run_captures_stdout() {
        let outcome = run_process(sh("printf hello"), None, RunOptions::default()).unwrap();
        assert_eq!(outcome.status, ExitKind::Exited(0));
        assert!(outcome.status.success());
        assert_eq!(outcome.stdout, b"hello");
        assert!(outcome.stderr.is_empty());
    }

    #[test]
    fn test_nonzero_exit_with_check_carries_exact_output() {
        let err = run_process(
            sh("printf out; printf err >&2; exit 7"),
            None,
            RunOptions::default(),
        )
        .unwrap_err();
        match err {
            ProfboxError::ProcessFailure(failure) => {
                assert_eq!(failure.status, ExitKind::Exited(7));
                assert_eq!(failure.stdout, b"out");
                assert_eq!(failure.stderr, b"err");
                assert!(failure.to_string().contains("non-zero exit status 7"));
            }
            other => panic!("expected ProcessFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_nonzero_exit_without_check() {
        let outcome = run_process(sh("exit 7"), None, no_check()).unwrap();
        assert_eq!(outcome.status, ExitKind::Exited(7));
        assert_eq!(outcome.status.code(), Some(7));
    }

    #[test]
    fn test_signaled_child_is_classified() {
        let outcome = run_process(sh("kill -KILL $$"), None, no_check()).unwrap();
        assert_eq!(outcome.status, ExitKind::Signaled(libc::SIGKILL));
        assert_eq!(outcome.status.signal(), Some(libc::SIGKILL));
        assert!(!outcome.status.success());
    }

    #[test]
    fn test_signaled_child_failure_names_signal() {
        let err = run_process(sh("kill -KILL $$"), None, RunOptions::default()).unwrap_err();
        assert!(err.to_string().contains("SIGKILL"), "{}", err);
    }

    #[test]
    fn test_stdin_roundtrip() {
        let outcome = run_process(
            vec!["cat".to_string()],
            None,
            RunOptions {
                stdin: Some(b"ping".to_vec()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(outcome.stdout, b"ping");
    }

    #[test]
    fn test_timeout_without_stop_signal() {
        let start = Instant::now();
        let err = run_process(
            sh("sleep 10"),
            None,
            RunOptions {
                timeout: Some(Duration::from_millis(300)),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ProfboxError::Timeout(_)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_stop_signal_cancels_run() {
        let stop = Arc::new(StopSignal::new());
        let setter = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            setter.set();
        });

        let start = Instant::now();
        let err = run_process(sh("sleep 10"), Some(&stop), RunOptions::default()).unwrap_err();
        handle.join().unwrap();

        assert!(matches!(err, ProfboxError::Stopped));
        // One poll slice plus margin, never the full sleep.
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_timeout_with_stop_signal_armed() {
        let stop = StopSignal::new();
        let err = run_process(
            sh("sleep 10"),
            Some(&stop),
            RunOptions {
                timeout: Some(Duration::from_millis(200)),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ProfboxError::Timeout(_)));
    }

    #[test]
    fn test_poll_process_reaps_on_stop() {
        let mut child = start_process(sh("sleep 10"), SpawnOptions::default()).unwrap();
        let pid = Pid::from_raw(child.id() as i32);

        let stop = StopSignal::new();
        stop.set();
        let err = poll_process(&mut child, Duration::from_secs(10), &stop).unwrap_err();
        assert!(matches!(err, ProfboxError::Stopped));

        // Terminated and reaped: the pid no longer exists.
        assert_eq!(signal::kill(pid, None), Err(nix::errno::Errno::ESRCH));
    }

    #[test]
    fn test_poll_process_passes_on_exit() {
        let mut child = start_process(vec!["true".to_string()], SpawnOptions::default()).unwrap();
        let stop = StopSignal::new();
        poll_process(&mut child, Duration::from_secs(10), &stop).unwrap();
    }

    #[test]
    fn test_poll_process_reaps_on_timeout() {
        let mut child = start_process(sh("sleep 10"), SpawnOptions::default()).unwrap();
        let pid = Pid::from_raw(child.id() as i32);

        let stop = StopSignal::new();
        let err = poll_process(&mut child, Duration::from_millis(200), &stop).unwrap_err();
        assert!(matches!(err, ProfboxError::Timeout(_)));
        assert_eq!(signal::kill(pid, None), Err(nix::errno::Errno::ESRCH));
    }
}
