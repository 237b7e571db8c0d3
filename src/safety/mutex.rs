/// The system-wide single-instance mutex.
///
/// The lock is a Unix socket bound to a fixed name in the abstract
/// namespace of the ROOT network namespace. The kernel tears the address
/// down with the socket, so a crashed holder releases the lock with no
/// stale-file cleanup, and running confined to a container's network
/// namespace does not fragment the lock space.
use std::os::unix::io::RawFd;
use std::sync::OnceLock;

use log::{debug, error, warn};
use nix::errno::Errno;
use nix::sys::socket::{bind, socket, AddressFamily, SockFlag, SockType, UnixAddr};
use nix::unistd::close;

use crate::error::{ProfboxError, Result};
use crate::kernel::namespace::{run_in_ns, NsKind, INIT_PID};

/// Fixed abstract-namespace address of the lock.
/// `ss -xp | grep profbox` shows the current holder.
const PROFILER_LOCK: &str = "profbox_lock";

/// The held socket IS the lock. Parked here for the process lifetime and
/// never closed; process exit is the only release.
static PROFILER_MUTEX: OnceLock<RawFd> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexAcquisition {
    /// The lock is ours until this process exits.
    Acquired,
    /// Another instance holds the lock. A normal outcome, not an error.
    AlreadyHeld,
}

impl MutexAcquisition {
    pub fn acquired(self) -> bool {
        matches!(self, MutexAcquisition::Acquired)
    }
}

/// Try to take the system-wide profiler mutex.
///
/// `Err` means the attempt itself failed (no privilege to reach the root
/// network namespace, or an unexpected bind failure) and is distinct from
/// the expected [`MutexAcquisition::AlreadyHeld`] contention outcome.
pub fn grab_profiler_mutex() -> Result<MutexAcquisition> {
    let bound = run_in_ns(&[NsKind::Network], INIT_PID, || try_bind_lock(PROFILER_LOCK))
        .map_err(|e| {
            error!(
                "Could not acquire the profiler mutex due to an error: {}. \
                 Are you running with elevated privileges?",
                e
            );
            e
        })?;

    match bound? {
        Some(fd) => {
            // First winner parks the fd; a repeated acquisition in the
            // same process sees its own bind as contention instead.
            let _ = PROFILER_MUTEX.set(fd);
            debug!("acquired the system-wide profiler mutex ({:?})", PROFILER_LOCK);
            Ok(MutexAcquisition::Acquired)
        }
        None => {
            warn!(
                "Could not acquire the profiler mutex. Is another instance running? \
                 Try 'ss -xp | grep {}' to see who holds it.",
                PROFILER_LOCK
            );
            Ok(MutexAcquisition::AlreadyHeld)
        }
    }
}

/// Bind a close-on-exec stream socket to the abstract `name`.
/// `Ok(None)` means the address is taken by another holder.
fn try_bind_lock(name: &str) -> Result<Option<RawFd>> {
    // Close-on-exec from the start: children we launch must not inherit
    // (and thereby pin) the lock.
    let fd = socket(
        AddressFamily::Unix,
        SockType::Stream,
        SockFlag::SOCK_CLOEXEC,
        None,
    )
    .map_err(|e| ProfboxError::Lock(format!("socket() failed: {}", e)))?;

    let addr = match UnixAddr::new_abstract(name.as_bytes()) {
        Ok(addr) => addr,
        Err(e) => {
            let _ = close(fd);
            return Err(ProfboxError::Lock(format!(
                "bad abstract address {:?}: {}",
                name, e
            )));
        }
    };

    match bind(fd, &addr) {
        Ok(()) => Ok(Some(fd)),
        Err(Errno::EADDRINUSE) => {
            let _ = close(fd);
            Ok(None)
        }
        Err(e) => {
            let _ = close(fd);
            Err(ProfboxError::Lock(format!(
                "failed to bind the lock socket: {}",
                e
            )))
        }
    }
}
