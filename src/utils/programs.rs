/// Lookup cache for external programs the profiler shells out to.
use std::sync::Mutex;

use crate::error::{ProfboxError, Result};
use crate::exec::supervisor::{run_process, RunOptions};

/// Program names already verified present. Each name is written at most
/// once (on its first successful lookup) and only read afterwards.
static INSTALLED_PROGRAMS: Mutex<Vec<String>> = Mutex::new(Vec::new());

/// Ensure `program` resolves on PATH, consulting the process-wide cache
/// first.
pub fn assert_program_installed(program: &str) -> Result<()> {
    {
        let cache = INSTALLED_PROGRAMS.lock().unwrap();
        if cache.iter().any(|name| name == program) {
            return Ok(());
        }
    }

    let outcome = run_process(
        vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("command -v -- '{}'", program),
        ],
        None,
        RunOptions {
            check: false,
            suppress_log: true,
            ..Default::default()
        },
    )?;

    if outcome.status.success() {
        INSTALLED_PROGRAMS.lock().unwrap().push(program.to_string());
        Ok(())
    } else {
        Err(ProfboxError::ProgramMissing(program.to_string()))
    }
}
