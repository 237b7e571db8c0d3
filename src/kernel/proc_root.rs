/// Path resolution through another process's filesystem root.
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{ProfboxError, Result};

/// Resolve `ns_path` the way the owner of `proc_root` sees it, where
/// `proc_root` is a directory standing in for that process's root
/// (typically `/proc/<pid>/root`).
///
/// Going through `/proc/<pid>/root` alone is not enough: an absolute
/// symlink inside the target resolves against OUR root and escapes the
/// emulated one. The path is therefore walked one component at a time,
/// and absolute link targets are re-rooted under `proc_root`; relative
/// targets are joined against the directory holding the link.
///
/// The final path is not required to exist, only the intermediate
/// symlinks must be readable.
pub fn resolve_proc_root_links(proc_root: &Path, ns_path: &Path) -> Result<PathBuf> {
    if !ns_path.is_absolute() {
        return Err(ProfboxError::Process(format!(
            "expected an absolute path, got {:?}",
            ns_path
        )));
    }

    let mut resolved = proc_root.to_path_buf();
    for component in ns_path.components() {
        let part = match component {
            Component::RootDir => continue,
            Component::Normal(part) => part,
            other => other.as_os_str(),
        };

        let mut next = resolved.join(part);
        let is_link = fs::symlink_metadata(&next)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        if is_link {
            let target = fs::read_link(&next)?;
            next = if target.is_absolute() {
                rebase(proc_root, &target)
            } else {
                resolved.join(target)
            };
        }
        resolved = next;
    }
    Ok(resolved)
}

fn rebase(proc_root: &Path, target: &Path) -> PathBuf {
    match target.strip_prefix("/") {
        Ok(stripped) => proc_root.join(stripped),
        Err(_) => proc_root.join(target),
    }
}
