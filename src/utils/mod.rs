//! Cross-cutting helpers shared by the profiling layers.

pub mod programs;
