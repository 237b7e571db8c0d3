/// Discovery of snapshot files that profiler subprocesses emit
/// asynchronously.
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use uuid::Uuid;

use crate::error::{ProfboxError, Result};
use crate::event::{wait_event, StopSignal};

/// Wait until a file matching `prefix*` exists, then return the single
/// canonical match.
///
/// Other writers race to create the file, and an erroneous or
/// signal-happy profiler run can leave several behind. Filenames carry a
/// sortable timestamp prefix, so lexicographic order is chronological:
/// when more than one match exists, the older ones are deleted and the
/// last one returned. Duplicates alone never fail the call; only the
/// wait's stop/timeout conditions (or a filesystem error) do.
pub fn wait_for_file_by_prefix(
    prefix: &Path,
    timeout: Duration,
    stop: &StopSignal,
) -> Result<PathBuf> {
    wait_event(timeout, stop, || {
        matches_by_prefix(prefix)
            .map(|matches| !matches.is_empty())
            .unwrap_or(false)
    })?;

    let mut matches = matches_by_prefix(prefix)?;
    if matches.len() != 1 {
        // Stale artifacts from a prior or misbehaving run; recover by
        // keeping only the newest.
        warn!(
            "One output file expected, but found {}. Removing all and using the last one. {:?}",
            matches.len(),
            matches
        );
        matches.sort();
        for stale in &matches[..matches.len().saturating_sub(1)] {
            fs::remove_file(stale)?;
        }
    }

    match matches.pop() {
        Some(last) => Ok(last),
        None => Err(ProfboxError::Process(format!(
            "output file with prefix {:?} disappeared while waiting",
            prefix
        ))),
    }
}

fn matches_by_prefix(prefix: &Path) -> std::io::Result<Vec<PathBuf>> {
    let dir = match prefix.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let stem = prefix
        .file_name()
        .map(|name| name.as_bytes().to_vec())
        .unwrap_or_default();

    let mut matches = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().as_bytes().starts_with(&stem) {
            matches.push(entry.path());
        }
    }
    Ok(matches)
}

/// A unique artifact-filename prefix for one snapshot cycle.
pub fn random_prefix() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_single_match_is_returned_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("snapshot-");
        fs::write(dir.path().join("snapshot-001"), b"data").unwrap();

        let stop = StopSignal::new();
        let found = wait_for_file_by_prefix(&prefix, Duration::from_secs(2), &stop).unwrap();
        assert_eq!(found, dir.path().join("snapshot-001"));
    }

    #[test]
    fn test_duplicates_resolve_to_newest_and_stale_ones_go_away() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("snapshot-");
        for name in ["snapshot-001", "snapshot-002", "snapshot-003"] {
            fs::write(dir.path().join(name), b"data").unwrap();
        }
        // A neighbor that does not match the prefix must survive.
        fs::write(dir.path().join("other-001"), b"data").unwrap();

        let stop = StopSignal::new();
        let found = wait_for_file_by_prefix(&prefix, Duration::from_secs(2), &stop).unwrap();
        assert_eq!(found, dir.path().join("snapshot-003"));
        assert!(!dir.path().join("snapshot-001").exists());
        assert!(!dir.path().join("snapshot-002").exists());
        assert!(dir.path().join("snapshot-003").exists());
        assert!(dir.path().join("other-001").exists());
    }

    #[test]
    fn test_waits_for_late_writer() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("out-");
        let late_path = dir.path().join("out-20260101T000000");
        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            fs::write(late_path, b"late").unwrap();
        });

        let stop = StopSignal::new();
        let start = Instant::now();
        let found = wait_for_file_by_prefix(&prefix, Duration::from_secs(5), &stop).unwrap();
        writer.join().unwrap();

        assert_eq!(found, dir.path().join("out-20260101T000000"));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_timeout_when_nothing_appears() {
        let dir = tempfile::tempdir().unwrap();
        let stop = StopSignal::new();
        let err = wait_for_file_by_prefix(
            &dir.path().join("never-"),
            Duration::from_millis(200),
            &stop,
        )
        .unwrap_err();
        assert!(matches!(err, ProfboxError::Timeout(_)));
    }

    #[test]
    fn test_stop_signal_cancels_the_wait() {
        let dir = tempfile::tempdir().unwrap();
        let stop = StopSignal::new();
        stop.set();
        let err =
            wait_for_file_by_prefix(&dir.path().join("never-"), Duration::from_secs(10), &stop)
                .unwrap_err();
        assert!(matches!(err, ProfboxError::Stopped));
    }

    #[test]
    fn test_random_prefixes_differ() {
        let a = random_prefix();
        let b = random_prefix();
        assert!(!a.is_empty());
        assert_ne!(a, b);
    }
}
