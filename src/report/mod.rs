//! One collection run, from input validation to the final artifact.
//!
//! Phases: validate inputs, set up the archive, open the session, select and
//! run plugins, write the manifest and logs, then package and move the result
//! into the output directory. Everything is staged in a private working
//! directory that is removed at the end unless a fatal error leaves data
//! worth keeping.

pub mod manifest;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Local, Utc};
use tempfile::TempDir;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::archive::{
    write_checksum, Archive, ArchiveError, Compression, HashName, DEFAULT_DIR_MODE,
};
use crate::emitters::{Engine, EnumeratorTable, Scope};
use crate::plugins::{self, PluginDescriptor, PluginOutcome, PluginStatus, RunError, Selection};
use crate::session::{self, SessionError, SessionOptions};
use crate::util::paths::{archive_name, LOG_FILE_NAME};
use crate::util::Ui;

use manifest::{Manifest, ManifestOptions, ManifestPlugins, ManifestSession, MANIFEST_PATH};

/// Directories every package carries, created before any plugin runs.
pub const STANDARD_DIRS: &[&str] = &["sos_logs", "sos_reports", "plugins"];

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("{0}")]
    Validation(String),
    #[error("{0} while setting up archive")]
    ArchiveSetup(String),
    #[error("failed to create working directory in {path}: {source}")]
    Workdir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("{source}; data collected still available at {workdir}")]
    Fatal {
        #[source]
        source: RunError,
        workdir: PathBuf,
    },
    #[error("failed to package report: {0}")]
    Package(#[from] ArchiveError),
    #[error("cancelled by user")]
    Cancelled,
}

impl ReportError {
    pub fn exit_code(&self) -> u8 {
        match self {
            ReportError::Cancelled => 130,
            _ => 1,
        }
    }
}

/// Inputs of a run, after CLI and config merging.
#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub vmcore: PathBuf,
    pub vmlinux: Option<PathBuf>,
    pub debuginfo_dirs: Vec<PathBuf>,
    pub selection: Selection,
    pub build: bool,
    pub label: Option<String>,
    /// Output directory for the final artifact
    pub tmp_dir: PathBuf,
    pub compression: Compression,
    pub hash: HashName,
    pub backend: String,
}

impl ReportOptions {
    pub fn new(vmcore: impl Into<PathBuf>) -> Self {
        Self {
            vmcore: vmcore.into(),
            vmlinux: None,
            debuginfo_dirs: Vec::new(),
            selection: Selection::default(),
            build: false,
            label: None,
            tmp_dir: std::env::temp_dir(),
            compression: Compression::default(),
            hash: HashName::default(),
            backend: session::DEFAULT_BACKEND.to_string(),
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct ReportSummary {
    /// Zip file, or the package directory with `--build`
    pub artifact: PathBuf,
    pub size: u64,
    pub checksum: Option<(HashName, String)>,
    pub checksum_file: Option<PathBuf>,
    pub outcomes: Vec<PluginOutcome>,
    /// Finalize-phase problems that did not stop the run
    pub warnings: Vec<String>,
}

pub struct VmcoreReport {
    opts: ReportOptions,
    ui: Ui,
    name: String,
    workdir: TempDir,
    catalog: Vec<PluginDescriptor>,
}

impl VmcoreReport {
    /// Create the private working directory inside the output directory.
    pub fn new(opts: ReportOptions, ui: Ui) -> Result<Self, ReportError> {
        let workdir = tempfile::Builder::new()
            .prefix(".vmcore-report-")
            .tempdir_in(&opts.tmp_dir)
            .map_err(|source| ReportError::Workdir {
                path: opts.tmp_dir.clone(),
                source,
            })?;
        let name = archive_name(opts.label.as_deref(), Local::now());
        Ok(Self {
            opts,
            ui,
            name,
            workdir,
            catalog: plugins::builtin_catalog(),
        })
    }

    /// Replace the plugin catalog discovery starts from.
    pub fn with_catalog(mut self, catalog: Vec<PluginDescriptor>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Where the run log should be written so it can be attached later.
    pub fn log_path(&self) -> PathBuf {
        self.workdir.path().join(LOG_FILE_NAME)
    }

    fn validate(&self) -> Result<(), ReportError> {
        if !self.opts.vmcore.exists() {
            return Err(ReportError::Validation(format!(
                "vmcore not found: {}",
                self.opts.vmcore.display()
            )));
        }
        if let Some(vmlinux) = &self.opts.vmlinux {
            if !vmlinux.exists() {
                return Err(ReportError::Validation(format!(
                    "vmlinux not found: {}",
                    vmlinux.display()
                )));
            }
        }
        for dir in &self.opts.debuginfo_dirs {
            if !dir.is_dir() {
                self.ui
                    .warn(format!("debuginfo directory not found: {}", dir.display()));
                tracing::warn!(dir = %dir.display(), "debuginfo directory not found");
            }
        }
        Ok(())
    }

    fn setup_archive(&self) -> Result<Archive, ReportError> {
        let setup = || -> Result<Archive, ArchiveError> {
            let archive = Archive::create(self.workdir.path(), &self.name)?;
            for dir in STANDARD_DIRS {
                archive.makedirs(dir, DEFAULT_DIR_MODE)?;
            }
            Ok(archive)
        };
        setup().map_err(|e| match e.io_error() {
            Some(io) if e.is_fatal() => ReportError::ArchiveSetup(io.to_string()),
            _ => ReportError::ArchiveSetup(e.to_string()),
        })
    }

    /// Run every phase. Consumes the report; the working directory is
    /// removed on return unless a fatal error keeps it.
    pub fn execute(self, cancel: CancellationToken) -> Result<ReportSummary, ReportError> {
        let started = Utc::now();
        let run_id = Uuid::new_v4();
        tracing::info!(run_id = %run_id, name = %self.name, vmcore = %self.opts.vmcore.display(), "Starting report");

        let check = || {
            if cancel.is_cancelled() {
                Err(ReportError::Cancelled)
            } else {
                Ok(())
            }
        };

        self.validate()?;
        check()?;

        let mut archive = self.setup_archive()?;
        check()?;

        let session = session::open(
            &self.opts.backend,
            &SessionOptions {
                snapshot: self.opts.vmcore.clone(),
                vmlinux: self.opts.vmlinux.clone(),
                debuginfo_dirs: self.opts.debuginfo_dirs.clone(),
            },
        )?;
        check()?;

        let selection = plugins::select(
            plugins::discover_from(self.catalog.clone()),
            &self.opts.selection,
        );
        for name in &selection.unknown {
            self.ui.warn(format!("Requested plugin '{name}' not found"));
        }
        if selection.selected.is_empty() {
            self.ui.warn("No vmcore-report plugins enabled");
            tracing::warn!("No vmcore-report plugins enabled");
        }

        let engine = Engine::new(EnumeratorTable::default()).with_cancellation(cancel.clone());
        let ui = self.ui;
        let run = plugins::run_plugins(
            &selection.selected,
            session.as_ref(),
            &mut archive,
            &engine,
            &cancel,
            |i, total, plugin| {
                ui.progress(format!(" Running {i}/{total}: {}...", plugin.name));
            },
        );
        ui.finish_progress();

        let outcomes = match run {
            Ok(outcomes) => outcomes,
            Err(RunError::Cancelled) => return Err(ReportError::Cancelled),
            Err(source) => {
                let workdir = self.workdir.keep();
                return Err(ReportError::Fatal { source, workdir });
            }
        };

        let mut warnings = Vec::new();

        let manifest = Manifest::new(
            run_id,
            started,
            ManifestOptions {
                vmcore: self.opts.vmcore.clone(),
                vmlinux: self.opts.vmlinux.clone(),
                debuginfo_dirs: self.opts.debuginfo_dirs.clone(),
                label: self.opts.label.clone(),
                build: self.opts.build,
                compression: self.opts.compression,
                selection: self.opts.selection.clone(),
            },
            ManifestSession {
                backend: session.backend_name().to_string(),
                debug_files: session.debug_files().to_vec(),
            },
            ManifestPlugins::new(&selection, &outcomes),
            Scope::all()
                .iter()
                .map(|scope| {
                    let root = archive.archive_path().join(scope.output_root());
                    (*scope, count_files(&root))
                })
                .collect(),
        );
        drop(session);

        match manifest.to_json() {
            Ok(json) => {
                if let Err(e) = archive.add_string(&json, MANIFEST_PATH, crate::archive::DEFAULT_FILE_MODE) {
                    tracing::warn!(error = %e, "Failed to write manifest");
                    self.ui.warn(format!("Failed to write manifest: {e}"));
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize manifest"),
        }

        let log_path = self.log_path();
        if log_path.exists() {
            let dest = format!("sos_logs/{LOG_FILE_NAME}");
            if let Err(e) = archive.add_file(&log_path, &dest) {
                tracing::warn!(error = %e, "Failed to attach log file");
            }
        }
        check()?;

        let summary = self.finalize(&archive, outcomes, &mut warnings)?;
        if summary.artifact.starts_with(self.workdir.path()) {
            let kept = self.workdir.keep();
            tracing::warn!(workdir = %kept.display(), "Keeping working directory with unmoved artifacts");
        }
        tracing::info!(artifact = %summary.artifact.display(), "Report complete");
        Ok(summary)
    }

    fn finalize(
        &self,
        archive: &Archive,
        outcomes: Vec<PluginOutcome>,
        warnings: &mut Vec<String>,
    ) -> Result<ReportSummary, ReportError> {
        let out_dir = &self.opts.tmp_dir;

        if self.opts.build {
            let dest = out_dir.join(&self.name);
            relocate(archive.archive_path(), &dest).map_err(|source| {
                ArchiveError::Io {
                    op: "move",
                    path: archive.archive_path().to_path_buf(),
                    source,
                }
            })?;
            return Ok(ReportSummary {
                size: dir_size(&dest),
                artifact: dest,
                checksum: None,
                checksum_file: None,
                outcomes,
                warnings: std::mem::take(warnings),
            });
        }

        self.ui.info(" Creating compressed archive...");
        let zip_path = archive.finalize(self.opts.compression)?;

        let mut checksum = None;
        let mut checksum_file = None;
        match write_checksum(&zip_path, self.opts.hash) {
            Ok((digest, sum_path)) => {
                checksum = Some((self.opts.hash, digest));
                checksum_file = Some(sum_path);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to compute checksum");
                warnings.push(format!("checksum failed: {e}"));
            }
        }

        let mut artifact = zip_path.clone();
        let dest = out_dir.join(zip_path.file_name().unwrap_or_default());
        match relocate(&zip_path, &dest) {
            Ok(()) => artifact = dest,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to move archive");
                warnings.push(format!("could not move archive to {}: {e}", out_dir.display()));
            }
        }
        if let Some(sum_path) = checksum_file.take() {
            let dest = out_dir.join(sum_path.file_name().unwrap_or_default());
            match relocate(&sum_path, &dest) {
                Ok(()) => checksum_file = Some(dest),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to move checksum file");
                    warnings.push(format!("could not move checksum file: {e}"));
                    checksum_file = Some(sum_path);
                }
            }
        }

        // Artifacts that could not be moved would vanish with the workdir.
        if artifact.starts_with(self.workdir.path()) {
            warnings.push(format!("archive left in {}", self.workdir.path().display()));
        }

        Ok(ReportSummary {
            size: fs::metadata(&artifact).map(|m| m.len()).unwrap_or(0),
            artifact,
            checksum,
            checksum_file,
            outcomes,
            warnings: std::mem::take(warnings),
        })
    }
}

/// Move a file or directory, copying when a rename crosses filesystems.
fn relocate(src: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            if src.is_dir() {
                copy_dir(src, dest)?;
                fs::remove_dir_all(src)
            } else {
                fs::copy(src, dest)?;
                fs::remove_file(src)
            }
        }
        Err(e) => Err(e),
    }
}

fn copy_dir(src: &Path, dest: &Path) -> io::Result<()> {
    fs::create_dir_all(dest)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

fn count_files(path: &Path) -> usize {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|e| match e.file_type() {
            Ok(t) if t.is_dir() => count_files(&e.path()),
            _ => 1,
        })
        .sum()
}

fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|e| match e.file_type() {
            Ok(t) if t.is_dir() => dir_size(&e.path()),
            _ => e.metadata().map(|m| m.len()).unwrap_or(0),
        })
        .sum()
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}{}", UNITS[0])
    } else {
        format!("{value:.1}{}", UNITS[unit])
    }
}

/// Print where the report went and how the plugins fared.
pub fn display_results(summary: &ReportSummary, ui: &Ui) {
    let failed: Vec<&PluginOutcome> = summary
        .outcomes
        .iter()
        .filter(|o| matches!(o.status, PluginStatus::Failed(_)))
        .collect();
    let inactive = summary
        .outcomes
        .iter()
        .filter(|o| o.status == PluginStatus::Inactive)
        .count();

    ui.info("");
    ui.info(format!(
        " {} plugin(s) completed, {} failed, {} inactive",
        summary.outcomes.len() - failed.len() - inactive,
        failed.len(),
        inactive
    ));
    for outcome in &failed {
        if let PluginStatus::Failed(e) = &outcome.status {
            ui.warn(format!("plugin {} failed: {e}", outcome.name));
        }
    }

    ui.info("");
    if summary.artifact.is_dir() {
        ui.info("Your vmcore-report build tree has been generated in:");
    } else {
        ui.info("Your vmcore-report archive has been generated and saved in:");
    }
    ui.info(format!("\t{}", summary.artifact.display()));
    ui.info("");
    ui.info(format!(" Size\t{}", human_size(summary.size)));
    if let Some((hash, digest)) = &summary.checksum {
        ui.info(format!(" {}\t{digest}", hash.as_str()));
    }
    for warning in &summary.warnings {
        ui.warn(warning);
    }
}
