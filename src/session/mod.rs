//! Introspection session over a kernel memory snapshot.
//!
//! The session is the read-only handle every producer and plugin receives.
//! Backends expose what they can resolve; every read primitive is typed and
//! fallible, and the defaults report `ReadError::Unsupported` so a backend
//! only implements the reads it actually understands.

pub mod debuginfo;
pub mod mock;
pub mod vmcoreinfo;

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

pub use debuginfo::collect_debug_files;
pub use vmcoreinfo::VmcoreInfoSession;

/// Name of the backend used when none is requested explicitly.
pub const DEFAULT_BACKEND: &str = "vmcoreinfo";

/// Errors returned by typed session reads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),
    #[error("task not found: {0}")]
    TaskNotFound(i64),
    #[error("read not supported by this backend: {0}")]
    Unsupported(&'static str),
    #[error("invalid value for {symbol}: {reason}")]
    InvalidValue { symbol: String, reason: String },
    #[error("memory read failed: {0}")]
    Fault(String),
}

/// Errors raised while opening a session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The requested backend is not available in this build.
    #[error("introspection backend '{0}' is not available (supported: {supported})", supported = supported_backends().join(", "))]
    BackendUnavailable(String),
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(PathBuf),
    #[error("unrecognized snapshot format: {0}")]
    UnrecognizedFormat(PathBuf),
    #[error("failed to open snapshot: {0}")]
    Io(#[from] std::io::Error),
}

/// Inputs needed to open a session.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub snapshot: PathBuf,
    pub vmlinux: Option<PathBuf>,
    pub debuginfo_dirs: Vec<PathBuf>,
}

impl SessionOptions {
    pub fn new(snapshot: impl Into<PathBuf>) -> Self {
        Self {
            snapshot: snapshot.into(),
            vmlinux: None,
            debuginfo_dirs: Vec::new(),
        }
    }
}

/// Kernel utsname fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UtsName {
    pub sysname: String,
    pub nodename: String,
    pub release: String,
    pub version: String,
    pub machine: String,
    pub domainname: String,
}

/// The subset of `struct task_struct` the producers render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskInfo {
    pub pid: i64,
    pub tgid: i64,
    pub ppid: i64,
    pub tracer_pid: i64,
    pub comm: String,
    pub state: char,
    pub state_value: u64,
    /// real, effective, saved, fs
    pub uid: [u32; 4],
    /// real, effective, saved, fs
    pub gid: [u32; 4],
    pub kthread: bool,
    pub oom_score_adj: Option<i64>,
    /// (soft, hard) pairs indexed like `RLIMIT_*`.
    pub rlimits: Vec<(u64, u64)>,
}

/// A loaded kernel module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub size: u64,
    pub refcnt: i64,
}

/// Read-only access to a snapshot.
pub trait Session {
    /// Short label for logs and the manifest.
    fn backend_name(&self) -> &str;

    /// Auxiliary symbol files the backend picked up.
    fn debug_files(&self) -> &[PathBuf] {
        &[]
    }

    fn symbol_u64(&self, _name: &str) -> Result<u64, ReadError> {
        Err(ReadError::Unsupported("symbol_u64"))
    }

    fn symbol_string(&self, _name: &str) -> Result<String, ReadError> {
        Err(ReadError::Unsupported("symbol_string"))
    }

    /// Kernel virtual address of a symbol.
    fn symbol_address(&self, _name: &str) -> Result<u64, ReadError> {
        Err(ReadError::Unsupported("symbol_address"))
    }

    fn utsname(&self) -> Result<UtsName, ReadError> {
        Err(ReadError::Unsupported("utsname"))
    }

    /// CPUs set in a cpumask symbol such as `cpu_online_mask`.
    fn cpumask(&self, _name: &str) -> Result<Vec<u32>, ReadError> {
        Err(ReadError::Unsupported("cpumask"))
    }

    /// Raw values from the canonical PID listing.
    ///
    /// Candidates are not validated; corrupted or type-ambiguous memory can
    /// surface as enormous or negative values.
    fn pid_candidates(&self) -> Result<Vec<i64>, ReadError> {
        Err(ReadError::Unsupported("pid_candidates"))
    }

    fn tasks(&self) -> Result<Vec<TaskInfo>, ReadError> {
        Err(ReadError::Unsupported("tasks"))
    }

    /// Follow the `init_task.tasks` list for at most `limit` steps.
    fn walk_task_list(&self, _limit: usize) -> Result<Vec<TaskInfo>, ReadError> {
        Err(ReadError::Unsupported("walk_task_list"))
    }

    fn find_task(&self, pid: i64) -> Result<TaskInfo, ReadError> {
        self.tasks()?
            .into_iter()
            .find(|t| t.pid == pid)
            .ok_or(ReadError::TaskNotFound(pid))
    }

    fn modules(&self) -> Result<Vec<ModuleInfo>, ReadError> {
        Err(ReadError::Unsupported("modules"))
    }

    fn taint_flags(&self) -> Result<Vec<String>, ReadError> {
        Err(ReadError::Unsupported("taint_flags"))
    }

    fn stack_trace(&self, _pid: i64) -> Result<String, ReadError> {
        Err(ReadError::Unsupported("stack_trace"))
    }
}

/// Backends compiled into this build.
pub fn supported_backends() -> Vec<&'static str> {
    vec![DEFAULT_BACKEND]
}

/// Open a session with the named backend.
///
/// Auxiliary debug data is gathered best-effort and never fails the open.
pub fn open(backend: &str, opts: &SessionOptions) -> Result<Box<dyn Session>, SessionError> {
    match backend {
        DEFAULT_BACKEND => {
            let debug_files = collect_debug_files(opts.vmlinux.as_deref(), &opts.debuginfo_dirs);
            let session = VmcoreInfoSession::open(&opts.snapshot, debug_files)?;
            Ok(Box::new(session))
        }
        other => Err(SessionError::BackendUnavailable(other.to_string())),
    }
}
