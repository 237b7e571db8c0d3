//! Launching and supervising profiler child processes.
//!
//! Each supervisor invocation owns exactly one child exclusively, and the
//! child is always reaped before the invocation returns, on every path.

pub mod scan;
pub mod spawn;
pub mod supervisor;

pub use scan::pgrep_maps;
pub use spawn::{start_process, SpawnOptions, STATIC_BUNDLE_DIR_ENV};
pub use supervisor::{poll_process, run_process, ExitKind, ProcessOutcome, RunOptions};
