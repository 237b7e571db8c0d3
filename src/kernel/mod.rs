//! Thin wrappers around Linux kernel interfaces.
//!
//! Evidence comes from the kernel, not from bookkeeping: namespace
//! identity is the ns-file inode, process names come from
//! /proc/<pid>/status, and path resolution follows what the target's
//! mount namespace actually contains.

pub mod namespace;
pub mod perf_event;
pub mod proc_root;
pub mod procfs;
