/// The namespace executor: run a callback on a disposable worker thread
/// joined into another process's Linux namespaces.
///
/// setns() affects only the calling OS thread, and a multithreaded process
/// cannot safely switch namespaces wholesale (CLONE_NEWNS in particular is
/// refused). Isolating the mutation to a single-use thread that is joined
/// and discarded is the core safety property here.
use std::fmt;
use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::thread;

use nix::errno::Errno;
use nix::sched::{setns, unshare, CloneFlags};
use nix::sys::stat;

use crate::error::{ProfboxError, Result};

/// The init process, the default namespace target.
pub const INIT_PID: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NsKind {
    Mount,
    Network,
    Pid,
    Uts,
}

impl NsKind {
    /// Name of the namespace file under `/proc/<pid>/ns/`.
    pub fn proc_name(self) -> &'static str {
        match self {
            NsKind::Mount => "mnt",
            NsKind::Network => "net",
            NsKind::Pid => "pid",
            NsKind::Uts => "uts",
        }
    }

    fn clone_flag(self) -> CloneFlags {
        match self {
            NsKind::Mount => CloneFlags::CLONE_NEWNS,
            NsKind::Network => CloneFlags::CLONE_NEWNET,
            NsKind::Pid => CloneFlags::CLONE_NEWPID,
            NsKind::Uts => CloneFlags::CLONE_NEWUTS,
        }
    }
}

impl fmt::Display for NsKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.proc_name())
    }
}

/// Path of a process's namespace file.
pub fn ns_path(pid: i32, kind: NsKind) -> PathBuf {
    PathBuf::from(format!("/proc/{}/ns/{}", pid, kind.proc_name()))
}

fn self_ns_path(kind: NsKind) -> PathBuf {
    PathBuf::from(format!("/proc/self/ns/{}", kind.proc_name()))
}

fn ns_inode(path: &PathBuf) -> Result<u64> {
    let st = stat::stat(path).map_err(|e| {
        ProfboxError::Namespace(format!("failed to stat {}: {}", path.display(), e))
    })?;
    Ok(st.st_ino)
}

/// Whether we share the `kind` namespace instance with `pid`, by
/// namespace-file inode identity.
pub fn is_same_ns(pid: i32, kind: NsKind) -> Result<bool> {
    Ok(ns_inode(&self_ns_path(kind))? == ns_inode(&ns_path(pid, kind))?)
}

/// Mount must come last: once the mount namespace changes, the thread's
/// view of /proc (and with it the remaining namespace files) goes away.
fn mount_last(kinds: &[NsKind]) -> Vec<NsKind> {
    let mut ordered = kinds.to_vec();
    ordered.sort_by_key(|kind| matches!(kind, NsKind::Mount));
    ordered
}

fn ns_error(op: &str, kind: NsKind, target_pid: i32, errno: Errno) -> ProfboxError {
    let message = format!("{}({}) for pid {} failed: {}", op, kind, target_pid, errno);
    if errno == Errno::EPERM {
        ProfboxError::Privilege(format!(
            "{} (are you running with elevated privileges?)",
            message
        ))
    } else {
        ProfboxError::Namespace(message)
    }
}

fn enter_ns(target_pid: i32, kind: NsKind) -> Result<()> {
    let flag = kind.clone_flag();
    unshare(flag).map_err(|e| ns_error("unshare", kind, target_pid, e))?;

    let path = ns_path(target_pid, kind);
    let ns_file = File::open(&path).map_err(|e| {
        ProfboxError::Namespace(format!("failed to open {}: {}", path.display(), e))
    })?;
    setns(ns_file.as_raw_fd(), flag).map_err(|e| ns_error("setns", kind, target_pid, e))
}

/// Run `callback` on a freshly spawned worker thread after joining the
/// requested namespaces of `target_pid`, and return its result. The
/// caller blocks until the worker completes; the worker (and its
/// namespace membership) is discarded afterwards.
///
/// Kinds where the thread already sits in the target's namespace instance
/// are skipped: redundant unshare/setns is not free of visibility side
/// effects. A failed unshare or setns aborts the whole invocation before
/// the callback runs; there are no retries.
pub fn run_in_ns<T, F>(kinds: &[NsKind], target_pid: i32, callback: F) -> Result<T>
where
    F: FnOnce() -> T + Send,
    T: Send,
{
    let ordered = mount_last(kinds);
    thread::scope(|scope| {
        let worker = scope.spawn(move || -> Result<T> {
            for kind in &ordered {
                if is_same_ns(target_pid, *kind)? {
                    continue;
                }
                enter_ns(target_pid, *kind)?;
            }
            Ok(callback())
        });
        worker.join().unwrap_or_else(|_| {
            Err(ProfboxError::Namespace(
                "namespace worker thread panicked".to_string(),
            ))
        })
    })
}
