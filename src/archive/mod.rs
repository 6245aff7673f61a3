//! Report package: a directory tree that is zipped on finalize.
//!
//! All writes go through relative paths that are normalized here, so a
//! producer can never escape the package root. Each relative path is written
//! at most once.

pub mod checksum;

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zip::write::FileOptions;

pub use checksum::{write_checksum, HashName};

pub const DEFAULT_FILE_MODE: u32 = 0o644;
pub const DEFAULT_DIR_MODE: u32 = 0o755;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("invalid archive path '{0}'")]
    InvalidPath(String),
    #[error("'{0}' already exists in the archive")]
    AlreadyExists(String),
    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("compression failed: {0}")]
    Zip(#[from] zip::result::ZipError),
}

impl ArchiveError {
    fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        ArchiveError::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// The underlying I/O error, if any.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            ArchiveError::Io { source, .. } => Some(source),
            ArchiveError::Zip(zip::result::ZipError::Io(e)) => Some(e),
            _ => None,
        }
    }

    /// Whether the error means the filesystem can take no more writes.
    pub fn is_fatal(&self) -> bool {
        self.io_error().is_some_and(is_fatal_fs_error)
    }
}

/// ENOSPC or EROFS: collection cannot usefully continue.
pub fn is_fatal_fs_error(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        if matches!(err.raw_os_error(), Some(libc::ENOSPC) | Some(libc::EROFS)) {
            return true;
        }
    }
    matches!(
        err.kind(),
        io::ErrorKind::StorageFull | io::ErrorKind::ReadOnlyFilesystem
    )
}

/// Compression applied when the package is finalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    Deflated,
    Stored,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::Deflated => "deflated",
            Compression::Stored => "stored",
        }
    }

    fn method(&self) -> zip::CompressionMethod {
        match self {
            Compression::Deflated => zip::CompressionMethod::Deflated,
            Compression::Stored => zip::CompressionMethod::Stored,
        }
    }
}

/// Normalize a package-relative path.
///
/// Leading slashes and `.` components are dropped; `..` and empty results
/// are rejected.
pub fn normalize(rel: &str) -> Result<PathBuf, ArchiveError> {
    let mut out = PathBuf::new();
    for component in Path::new(rel.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(ArchiveError::InvalidPath(rel.to_string()))
            }
        }
    }
    if out.as_os_str().is_empty() {
        return Err(ArchiveError::InvalidPath(rel.to_string()));
    }
    Ok(out)
}

fn key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Directory-backed package under a private working directory.
#[derive(Debug)]
pub struct Archive {
    name: String,
    root: PathBuf,
    written: HashSet<String>,
}

impl Archive {
    /// Create `<workdir>/<name>` as the package root.
    pub fn create(workdir: &Path, name: &str) -> Result<Self, ArchiveError> {
        let root = workdir.join(name);
        fs::create_dir_all(&root).map_err(|e| ArchiveError::io("create", &root, e))?;
        tracing::debug!(root = %root.display(), "Created archive directory");
        Ok(Self {
            name: name.to_string(),
            root,
            written: HashSet::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The uncompressed package directory.
    pub fn archive_path(&self) -> &Path {
        &self.root
    }

    /// Number of files written so far.
    pub fn write_count(&self) -> usize {
        self.written.len()
    }

    pub fn contains(&self, rel: &str) -> bool {
        normalize(rel).is_ok_and(|p| self.written.contains(&key(&p)))
    }

    pub fn makedirs(&self, rel: &str, mode: u32) -> Result<PathBuf, ArchiveError> {
        let dest = self.root.join(normalize(rel)?);
        fs::create_dir_all(&dest).map_err(|e| ArchiveError::io("mkdir", &dest, e))?;
        set_mode(&dest, mode)?;
        Ok(dest)
    }

    /// Resolve `rel` to a fresh destination. The path only counts as
    /// written once the caller records it.
    fn reserve(&self, rel: &str) -> Result<(PathBuf, String), ArchiveError> {
        let path = normalize(rel)?;
        let k = key(&path);
        if self.written.contains(&k) {
            return Err(ArchiveError::AlreadyExists(k));
        }
        let dest = self.root.join(&path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::io("mkdir", parent, e))?;
        }
        Ok((dest, k))
    }

    /// Write `text` at `rel` with unix permission `mode`.
    pub fn add_string(&mut self, text: &str, rel: &str, mode: u32) -> Result<PathBuf, ArchiveError> {
        let (dest, k) = self.reserve(rel)?;
        let mut file = File::create(&dest).map_err(|e| ArchiveError::io("create", &dest, e))?;
        file.write_all(text.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| ArchiveError::io("write", &dest, e))?;
        set_mode(&dest, mode)?;
        self.written.insert(k);
        Ok(dest)
    }

    /// Copy an existing file into the package at `rel`.
    pub fn add_file(&mut self, src: &Path, rel: &str) -> Result<PathBuf, ArchiveError> {
        let (dest, k) = self.reserve(rel)?;
        fs::copy(src, &dest).map_err(|e| ArchiveError::io("copy", src, e))?;
        self.written.insert(k);
        Ok(dest)
    }

    /// Zip the package next to its directory and return the artifact path.
    ///
    /// Entries are stored under `<name>/` in sorted order.
    pub fn finalize(&self, compression: Compression) -> Result<PathBuf, ArchiveError> {
        let out_path = self
            .root
            .with_file_name(format!("{}.zip", self.name));
        let zip_file =
            File::create(&out_path).map_err(|e| ArchiveError::io("create", &out_path, e))?;
        let mut zip = zip::ZipWriter::new(zip_file);
        let options = FileOptions::default().compression_method(compression.method());

        let mut entries = Vec::new();
        collect_entries(&self.root, &self.root, &mut entries)?;
        entries.sort();

        for (rel, is_dir) in entries {
            let name = format!("{}/{}", self.name, rel);
            if is_dir {
                zip.add_directory(name, options)?;
            } else {
                let src = self.root.join(&rel);
                let mode = file_mode(&src);
                zip.start_file(name, options.unix_permissions(mode))?;
                let mut f = File::open(&src).map_err(|e| ArchiveError::io("open", &src, e))?;
                io::copy(&mut f, &mut zip).map_err(|e| ArchiveError::io("compress", &src, e))?;
            }
        }

        let mut zip_file = zip.finish()?;
        zip_file
            .flush()
            .map_err(|e| ArchiveError::io("write", &out_path, e))?;
        tracing::info!(
            artifact = %out_path.display(),
            compression = compression.as_str(),
            "Finalized archive"
        );
        Ok(out_path)
    }
}

fn collect_entries(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(String, bool)>,
) -> Result<(), ArchiveError> {
    let entries = fs::read_dir(dir).map_err(|e| ArchiveError::io("read", dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ArchiveError::io("read", dir, e))?;
        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .map(key)
            .map_err(|_| ArchiveError::InvalidPath(path.display().to_string()))?;
        if path.is_dir() {
            out.push((rel, true));
            collect_entries(root, &path, out)?;
        } else {
            out.push((rel, false));
        }
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), ArchiveError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| ArchiveError::io("chmod", path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), ArchiveError> {
    Ok(())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o777)
        .unwrap_or(DEFAULT_FILE_MODE)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> u32 {
    DEFAULT_FILE_MODE
}
