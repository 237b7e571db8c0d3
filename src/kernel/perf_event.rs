/// The perf mlock budget knob.
use std::fs;

use crate::error::{ProfboxError, Result};

/// Per-unprivileged-user budget of mlocked perf buffer memory, in kb.
pub const PERF_EVENT_MLOCK_KB: &str = "/proc/sys/kernel/perf_event_mlock_kb";

pub fn read_perf_event_mlock_kb() -> Result<i64> {
    let text = fs::read_to_string(PERF_EVENT_MLOCK_KB)?;
    text.trim().parse().map_err(|e| {
        ProfboxError::Process(format!(
            "malformed {} value {:?}: {}",
            PERF_EVENT_MLOCK_KB,
            text.trim(),
            e
        ))
    })
}

pub fn write_perf_event_mlock_kb(kb: i64) -> Result<()> {
    fs::write(PERF_EVENT_MLOCK_KB, kb.to_string())?;
    Ok(())
}
