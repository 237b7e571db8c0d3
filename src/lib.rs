//! profbox: process-control and kernel-namespace substrate for a
//! continuous profiler.
//!
//! The profiler proper repeatedly launches external profiling binaries,
//! collects the snapshot files they emit, and reaches into other
//! processes through their Linux namespaces. This crate owns the
//! OS-interaction layer underneath that:
//!
//! - [`event`]: the level-triggered stop signal and the cancellable wait
//!   loop every blocking operation goes through
//! - [`exec`]: child-process launch and supervision with guaranteed
//!   terminate-and-reap, plus best-effort /proc maps scanning
//! - [`kernel`]: the disposable-thread namespace executor,
//!   /proc/<pid>/status introspection, mount-namespace-aware path
//!   resolution, and the perf mlock knob
//! - [`safety`]: the abstract-socket system-wide mutex and
//!   snapshot-artifact discovery
//! - [`utils`]: the installed-program lookup cache
//!
//! # Design principles
//!
//! 1. **Cleanup before propagation** - a child process is terminated and
//!    reaped before any stop/timeout condition reaches the caller; no
//!    error implies a leaked OS resource
//! 2. **Kernel as truth** - namespace identity is ns-file inode identity,
//!    lock liveness is socket lifetime, process state comes from /proc
//! 3. **Thread-local namespace mutation** - namespace joins happen on
//!    single-use worker threads that are joined and discarded, never on
//!    long-lived threads
//! 4. **Contention is not an error** - "another instance holds the lock"
//!    and "process exited mid-scan" are expected outcomes, kept apart
//!    from real failures

pub mod error;
pub mod event;
pub mod exec;
pub mod kernel;
pub mod safety;
pub mod utils;

pub use error::{ProcessFailure, ProfboxError, Result};
pub use event::{wait_event, StopSignal};
pub use exec::{
    pgrep_maps, poll_process, run_process, start_process, ExitKind, ProcessOutcome, RunOptions,
    SpawnOptions,
};
pub use kernel::namespace::{is_same_ns, run_in_ns, NsKind, INIT_PID};
pub use kernel::proc_root::resolve_proc_root_links;
pub use kernel::procfs::{is_running_in_init_pid_ns, process_comm, process_nspid};
pub use safety::artifacts::{random_prefix, wait_for_file_by_prefix};
pub use safety::mutex::{grab_profiler_mutex, MutexAcquisition};
pub use utils::programs::assert_program_installed;
