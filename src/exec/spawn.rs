/// Child-process launch.
///
/// Every child gets piped stdio (unless redirected to files), its own
/// process group, and a debug-level trace of the command line. Launches
/// from a statically-bundled build are rewritten to go through the
/// bundle's dynamic linker when asked to, and otherwise have the bundle's
/// library path scrubbed from their environment.
use std::collections::HashMap;
use std::fs::File;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use log::debug;

use crate::error::{ProfboxError, Result};

/// Set by the static launcher to the directory it extracted its bundled
/// dynamic linker and libraries into.
pub const STATIC_BUNDLE_DIR_ENV: &str = "STATICX_BUNDLE_DIR";

const BUNDLE_INTERP: &str = ".staticx.interp";

#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Launch through the bundled dynamic linker; only meaningful when
    /// running from a statically-bundled build.
    pub via_static_launcher: bool,
    /// Replace the child's environment wholesale.
    pub env: Option<HashMap<String, String>>,
    pub cwd: Option<PathBuf>,
    /// Redirect stdout to a file instead of capturing it through a pipe.
    pub stdout_file: Option<PathBuf>,
    /// Redirect stderr to a file instead of capturing it through a pipe.
    pub stderr_file: Option<PathBuf>,
}

/// Rewrite `argv` (and possibly the environment) for children of a
/// statically-bundled launcher.
///
/// Binaries shipped inside the bundle must run under the bundle's own
/// dynamic linker. Everything else must NOT see the launcher's
/// LD_LIBRARY_PATH, or it would pick up the bundled libraries.
fn apply_static_launcher(
    argv: Vec<String>,
    via_static_launcher: bool,
    bundle_dir: Option<&str>,
) -> (Vec<String>, Option<(&'static str, String)>) {
    match bundle_dir {
        Some(dir) if via_static_launcher => {
            let mut rewritten = vec![
                format!("{}/{}", dir, BUNDLE_INTERP),
                "--library-path".to_string(),
                dir.to_string(),
            ];
            rewritten.extend(argv);
            (rewritten, None)
        }
        Some(_) => (argv, Some(("LD_LIBRARY_PATH", String::new()))),
        None => (argv, None),
    }
}

fn stdio_for(redirect: &Option<PathBuf>) -> Result<Stdio> {
    Ok(match redirect {
        Some(path) => Stdio::from(File::create(path)?),
        None => Stdio::piped(),
    })
}

/// Launch a child process without waiting for it.
///
/// The returned [`Child`] is owned exclusively by its supervisor; see
/// [`run_process`](crate::exec::run_process) for the supervised variant.
pub fn start_process<I, S>(cmd: I, opts: SpawnOptions) -> Result<Child>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let argv: Vec<String> = cmd.into_iter().map(Into::into).collect();
    if argv.is_empty() {
        return Err(ProfboxError::Process("empty command".to_string()));
    }
    debug!("Running command: ({})", argv.join(" "));

    let bundle_dir = std::env::var(STATIC_BUNDLE_DIR_ENV).ok();
    let (argv, env_fixup) =
        apply_static_launcher(argv, opts.via_static_launcher, bundle_dir.as_deref());

    let mut command = Command::new(&argv[0]);
    command.args(&argv[1..]);
    command.stdin(Stdio::piped());
    command.stdout(stdio_for(&opts.stdout_file)?);
    command.stderr(stdio_for(&opts.stderr_file)?);
    // Own process group: signals aimed at the profiler must not fan out
    // to supervised workloads through the controlling terminal.
    command.process_group(0);

    if let Some(env) = &opts.env {
        command.env_clear();
        command.envs(env);
    }
    if let Some((key, value)) = env_fixup {
        command.env(key, value);
    }
    if let Some(cwd) = &opts.cwd {
        command.current_dir(cwd);
    }

    command
        .spawn()
        .map_err(|e| ProfboxError::Process(format!("failed to spawn {:?}: {}", argv[0], e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_launcher_binary_is_run_through_bundled_interp() {
        let (rewritten, env) =
            apply_static_launcher(argv(&["perf", "record"]), true, Some("/tmp/bundle"));
        assert_eq!(
            rewritten,
            argv(&[
                "/tmp/bundle/.staticx.interp",
                "--library-path",
                "/tmp/bundle",
                "perf",
                "record",
            ])
        );
        assert!(env.is_none());
    }

    #[test]
    fn test_other_binaries_get_library_path_scrubbed() {
        let (rewritten, env) = apply_static_launcher(argv(&["ls"]), false, Some("/tmp/bundle"));
        assert_eq!(rewritten, argv(&["ls"]));
        assert_eq!(env, Some(("LD_LIBRARY_PATH", String::new())));
    }

    #[test]
    fn test_no_bundle_means_no_rewrite() {
        let (rewritten, env) = apply_static_launcher(argv(&["ls"]), true, None);
        assert_eq!(rewritten, argv(&["ls"]));
        assert!(env.is_none());
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let result = start_process(Vec::<String>::new(), SpawnOptions::default());
        assert!(result.is_err());
    }
}
