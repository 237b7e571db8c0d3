//! Process-wide safety primitives: the single-instance mutex and
//! snapshot-artifact hygiene.

pub mod artifacts;
pub mod mutex;
