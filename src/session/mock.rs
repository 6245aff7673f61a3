//! Mock session for deterministic testing
//!
//! Implements the `Session` trait over pre-configured values so producers,
//! enumerators, and plugins can be exercised without a real snapshot.
//! Anything not configured answers the same way a limited backend would:
//! `SymbolNotFound` for symbols, `Unsupported` for everything else.
//!
//! # Example
//! ```
//! use vmcore_report::session::mock::MockSession;
//! use vmcore_report::session::Session;
//!
//! let session = MockSession::new()
//!     .with_u64("nr_cpu_ids", 4)
//!     .with_string("saved_command_line", "root=/dev/sda1 ro");
//!
//! assert_eq!(session.symbol_u64("nr_cpu_ids").unwrap(), 4);
//! ```

use std::cell::Cell;
use std::collections::HashMap;

use super::{ModuleInfo, ReadError, Session, TaskInfo, UtsName};

/// Session double configured through builder methods.
#[derive(Debug, Default, Clone)]
pub struct MockSession {
    numbers: HashMap<String, u64>,
    strings: HashMap<String, String>,
    cpumasks: HashMap<String, Vec<u32>>,
    utsname: Option<UtsName>,
    pid_candidates: Option<Vec<i64>>,
    tasks: Option<Vec<TaskInfo>>,
    task_list: Option<Vec<TaskInfo>>,
    modules: Option<Vec<ModuleInfo>>,
    taints: Option<Vec<String>>,
    stacks: HashMap<i64, String>,
    /// Number of reads served, for asserting that work was (not) done.
    reads: Cell<usize>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_u64(mut self, name: &str, value: u64) -> Self {
        self.numbers.insert(name.to_string(), value);
        self
    }

    pub fn with_string(mut self, name: &str, value: &str) -> Self {
        self.strings.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_cpumask(mut self, name: &str, cpus: Vec<u32>) -> Self {
        self.cpumasks.insert(name.to_string(), cpus);
        self
    }

    pub fn with_utsname(mut self, uts: UtsName) -> Self {
        self.utsname = Some(uts);
        self
    }

    pub fn with_pid_candidates(mut self, pids: Vec<i64>) -> Self {
        self.pid_candidates = Some(pids);
        self
    }

    /// Add a task visible through `tasks()` and `find_task()`.
    pub fn with_task(mut self, task: TaskInfo) -> Self {
        self.tasks.get_or_insert_with(Vec::new).push(task);
        self
    }

    /// Configure `tasks()` to succeed with an empty listing.
    pub fn with_empty_tasks(mut self) -> Self {
        self.tasks = Some(Vec::new());
        self
    }

    /// Tasks reachable only by walking the `init_task` list.
    pub fn with_task_list(mut self, tasks: Vec<TaskInfo>) -> Self {
        self.task_list = Some(tasks);
        self
    }

    pub fn with_modules(mut self, modules: Vec<ModuleInfo>) -> Self {
        self.modules = Some(modules);
        self
    }

    pub fn with_taints(mut self, taints: Vec<&str>) -> Self {
        self.taints = Some(taints.into_iter().map(str::to_string).collect());
        self
    }

    pub fn with_stack(mut self, pid: i64, trace: &str) -> Self {
        self.stacks.insert(pid, trace.to_string());
        self
    }

    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    fn count(&self) {
        self.reads.set(self.reads.get() + 1);
    }
}

impl Session for MockSession {
    fn backend_name(&self) -> &str {
        "mock"
    }

    fn symbol_u64(&self, name: &str) -> Result<u64, ReadError> {
        self.count();
        self.numbers
            .get(name)
            .copied()
            .ok_or_else(|| ReadError::SymbolNotFound(name.to_string()))
    }

    fn symbol_string(&self, name: &str) -> Result<String, ReadError> {
        self.count();
        self.strings
            .get(name)
            .cloned()
            .ok_or_else(|| ReadError::SymbolNotFound(name.to_string()))
    }

    fn utsname(&self) -> Result<UtsName, ReadError> {
        self.count();
        self.utsname
            .clone()
            .ok_or_else(|| ReadError::SymbolNotFound("init_uts_ns".to_string()))
    }

    fn cpumask(&self, name: &str) -> Result<Vec<u32>, ReadError> {
        self.count();
        self.cpumasks
            .get(name)
            .cloned()
            .ok_or_else(|| ReadError::SymbolNotFound(name.to_string()))
    }

    fn pid_candidates(&self) -> Result<Vec<i64>, ReadError> {
        self.count();
        self.pid_candidates
            .clone()
            .ok_or(ReadError::Unsupported("pid_candidates"))
    }

    fn tasks(&self) -> Result<Vec<TaskInfo>, ReadError> {
        self.count();
        self.tasks.clone().ok_or(ReadError::Unsupported("tasks"))
    }

    fn walk_task_list(&self, limit: usize) -> Result<Vec<TaskInfo>, ReadError> {
        self.count();
        self.task_list
            .as_ref()
            .map(|list| list.iter().take(limit).cloned().collect())
            .ok_or_else(|| ReadError::SymbolNotFound("init_task".to_string()))
    }

    fn modules(&self) -> Result<Vec<ModuleInfo>, ReadError> {
        self.count();
        self.modules.clone().ok_or(ReadError::Unsupported("modules"))
    }

    fn taint_flags(&self) -> Result<Vec<String>, ReadError> {
        self.count();
        self.taints.clone().ok_or(ReadError::Unsupported("taint_flags"))
    }

    fn stack_trace(&self, pid: i64) -> Result<String, ReadError> {
        self.count();
        self.stacks
            .get(&pid)
            .cloned()
            .ok_or(ReadError::TaskNotFound(pid))
    }
}
