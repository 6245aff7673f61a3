//! Discovery of auxiliary debug symbol files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const MODULE_DEBUG_SUFFIX: &str = ".ko.debug";

/// Collect debug symbol files from an explicit vmlinux and search directories.
///
/// An existing `vmlinux` comes first. Then, for each directory in order:
/// `<dir>/vmlinux`, followed by every `*.ko.debug` below it. Missing or
/// unreadable entries are skipped. Symlinked directories are not descended
/// into. The result is deduplicated on the resolved path and keeps
/// first-seen order.
pub fn collect_debug_files(vmlinux: Option<&Path>, dirs: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if let Some(path) = vmlinux {
        if path.is_file() {
            files.push(path.to_path_buf());
        }
    }

    let mut visited = HashSet::new();
    for dir in dirs {
        if !dir.is_dir() {
            tracing::debug!(dir = %dir.display(), "Skipping non-directory debuginfo path");
            continue;
        }
        let candidate = dir.join("vmlinux");
        if candidate.is_file() {
            files.push(candidate);
        }
        walk_module_debug(dir, &mut visited, &mut files);
    }

    let mut seen = HashSet::new();
    files.retain(|f| seen.insert(fs::canonicalize(f).unwrap_or_else(|_| f.clone())));
    files
}

fn is_module_debug(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(MODULE_DEBUG_SUFFIX))
}

fn walk_module_debug(dir: &Path, visited: &mut HashSet<PathBuf>, out: &mut Vec<PathBuf>) {
    let canonical = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    if !visited.insert(canonical) {
        return;
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "Unable to read debuginfo directory");
            return;
        }
    };

    // Sorted so the load order does not depend on directory iteration order.
    let mut entries: Vec<(PathBuf, fs::FileType)> = entries
        .filter_map(Result::ok)
        .filter_map(|e| e.file_type().ok().map(|t| (e.path(), t)))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut subdirs = Vec::new();
    for (path, file_type) in entries {
        if file_type.is_dir() {
            subdirs.push(path);
        } else if file_type.is_symlink() {
            if path.is_file() && is_module_debug(&path) {
                out.push(path);
            } else {
                tracing::debug!(path = %path.display(), "Not following symlink in debuginfo directory");
            }
        } else if is_module_debug(&path) {
            out.push(path);
        }
    }
    for sub in subdirs {
        walk_module_debug(&sub, visited, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn collects_vmlinux_then_module_debug_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("vmlinux"), b"elf").unwrap();
        fs::write(root.join("ext4.ko.debug"), b"").unwrap();
        fs::write(root.join("notes.txt"), b"").unwrap();
        fs::create_dir_all(root.join("kernel/net")).unwrap();
        fs::write(root.join("kernel/net/tun.ko.debug"), b"").unwrap();

        let explicit = root.join("vmlinux");
        let files = collect_debug_files(Some(&explicit), &[root.to_path_buf()]);

        assert_eq!(
            files,
            vec![
                root.join("vmlinux"),
                root.join("ext4.ko.debug"),
                root.join("kernel/net/tun.ko.debug"),
            ]
        );
    }

    #[test]
    fn missing_inputs_yield_nothing() {
        let files = collect_debug_files(
            Some(Path::new("/nonexistent/vmlinux")),
            &[PathBuf::from("/nonexistent/debug")],
        );
        assert!(files.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycles_do_not_repeat_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("lib/modules")).unwrap();
        fs::write(root.join("lib/modules/ext4.ko.debug"), b"").unwrap();
        std::os::unix::fs::symlink(root, root.join("lib/modules/loop")).unwrap();
        std::os::unix::fs::symlink(root, root.join("lib/modules/loop2")).unwrap();

        let files = collect_debug_files(None, &[root.to_path_buf()]);
        assert_eq!(files, vec![root.join("lib/modules/ext4.ko.debug")]);
    }

    #[cfg(unix)]
    #[test]
    fn same_directory_listed_twice_is_walked_once() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("tun.ko.debug"), b"").unwrap();
        std::os::unix::fs::symlink(root, dir.path().join("alias")).unwrap();

        let files = collect_debug_files(None, &[root.to_path_buf(), root.join("alias")]);
        assert_eq!(files, vec![root.join("tun.ko.debug")]);
    }
}
