//! Enumerators: named generators of key-sets for templated producers.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Context};

use crate::session::Session;

/// Used when `pid_max` cannot be read from the snapshot.
pub const DEFAULT_PID_MAX: u64 = 1_000_000;

/// Upper bound on `init_task` list steps.
pub const TASK_WALK_LIMIT: usize = 1 << 20;

/// Placeholder name to value bindings for one templated invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct KeySet(BTreeMap<String, String>);

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(key: &str, value: impl ToString) -> Self {
        let mut keys = Self::new();
        keys.insert(key, value);
        keys
    }

    pub fn insert(&mut self, key: &str, value: impl ToString) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Parse a bound value, failing when the key is absent or malformed.
    pub fn value<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let raw = self
            .get(key)
            .ok_or_else(|| anyhow!("missing key '{key}'"))?;
        raw.parse::<T>()
            .with_context(|| format!("invalid value '{raw}' for key '{key}'"))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

pub type EnumeratorFn = Arc<dyn Fn(&dyn Session) -> Vec<KeySet> + Send + Sync>;

/// Immutable name to enumerator table handed to the engine.
#[derive(Clone)]
pub struct EnumeratorTable {
    entries: HashMap<String, EnumeratorFn>,
}

impl EnumeratorTable {
    /// A table with no enumerators.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Return a copy of the table with `name` bound to `f`.
    pub fn with<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&dyn Session) -> Vec<KeySet> + Send + Sync + 'static,
    {
        self.entries.insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn get(&self, name: &str) -> Option<&EnumeratorFn> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for EnumeratorTable {
    fn default() -> Self {
        Self::empty()
            .with("enumerate_pids", enumerate_pids)
            .with("enumerate_cpus", enumerate_cpus)
    }
}

impl fmt::Debug for EnumeratorTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumeratorTable")
            .field("names", &self.names())
            .finish()
    }
}

fn pid_keys(mut pids: Vec<i64>) -> Vec<KeySet> {
    pids.sort_unstable();
    pids.dedup();
    pids.into_iter().map(|pid| KeySet::single("pid", pid)).collect()
}

/// PIDs of every task in the snapshot.
///
/// Strategies are tried in order: the canonical PID listing bounded by
/// `pid_max`, the task listing, then a bounded `init_task` walk. Never fails.
pub fn enumerate_pids(session: &dyn Session) -> Vec<KeySet> {
    let pid_max = session
        .symbol_u64("pid_max")
        .ok()
        .and_then(|v| i64::try_from(v).ok())
        .unwrap_or(DEFAULT_PID_MAX as i64);

    match session.pid_candidates() {
        Ok(candidates) => {
            let pids: Vec<i64> = candidates
                .into_iter()
                .filter(|pid| *pid > 0 && *pid <= pid_max)
                .collect();
            if !pids.is_empty() {
                return pid_keys(pids);
            }
            tracing::debug!("PID listing yielded no plausible pids, trying task listing");
        }
        Err(e) => tracing::debug!(error = %e, "PID listing unavailable"),
    }

    match session.tasks() {
        Ok(tasks) => {
            return pid_keys(tasks.into_iter().map(|t| t.pid).filter(|pid| *pid > 0).collect());
        }
        Err(e) => tracing::debug!(error = %e, "Task listing unavailable"),
    }

    match session.walk_task_list(TASK_WALK_LIMIT) {
        Ok(tasks) => pid_keys(tasks.into_iter().map(|t| t.pid).filter(|pid| *pid > 0).collect()),
        Err(e) => {
            tracing::debug!(error = %e, "Task list walk failed, no pids enumerated");
            Vec::new()
        }
    }
}

/// Online CPUs, falling back to `0..nr_cpu_ids` and then to CPU 0.
pub fn enumerate_cpus(session: &dyn Session) -> Vec<KeySet> {
    match session.cpumask("cpu_online_mask") {
        Ok(cpus) => {
            return cpus.into_iter().map(|cpu| KeySet::single("cpu", cpu)).collect();
        }
        Err(e) => tracing::debug!(error = %e, "cpu_online_mask unavailable"),
    }

    match session.symbol_u64("nr_cpu_ids") {
        Ok(n) if n > 0 => (0..n).map(|cpu| KeySet::single("cpu", cpu)).collect(),
        _ => vec![KeySet::single("cpu", 0)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::MockSession;
    use crate::session::TaskInfo;

    fn task(pid: i64) -> TaskInfo {
        TaskInfo {
            pid,
            ..TaskInfo::default()
        }
    }

    fn pids(keys: &[KeySet]) -> Vec<i64> {
        keys.iter().map(|k| k.value::<i64>("pid").unwrap()).collect()
    }

    #[test]
    fn pid_candidates_are_bounded_sorted_and_deduplicated() {
        let session = MockSession::new()
            .with_u64("pid_max", 32768)
            .with_pid_candidates(vec![300, 1, -4, 0, 1, 99_999_999, 2]);
        assert_eq!(pids(&enumerate_pids(&session)), vec![1, 2, 300]);
    }

    #[test]
    fn pid_max_defaults_when_unreadable() {
        let session = MockSession::new().with_pid_candidates(vec![999_999, 1_000_001]);
        assert_eq!(pids(&enumerate_pids(&session)), vec![999_999]);
    }

    #[test]
    fn implausible_candidates_fall_back_to_tasks() {
        let session = MockSession::new()
            .with_pid_candidates(vec![-1, i64::MAX])
            .with_task(task(7))
            .with_task(task(0))
            .with_task(task(3));
        assert_eq!(pids(&enumerate_pids(&session)), vec![3, 7]);
    }

    #[test]
    fn empty_task_listing_is_final() {
        let session = MockSession::new()
            .with_empty_tasks()
            .with_task_list(vec![task(1), task(2)]);
        assert!(enumerate_pids(&session).is_empty());
    }

    #[test]
    fn walks_task_list_as_last_resort() {
        let session = MockSession::new().with_task_list(vec![task(2), task(1), task(2)]);
        assert_eq!(pids(&enumerate_pids(&session)), vec![1, 2]);
    }

    #[test]
    fn no_strategy_yields_nothing() {
        assert!(enumerate_pids(&MockSession::new()).is_empty());
    }

    #[test]
    fn cpus_prefer_online_mask() {
        let session = MockSession::new()
            .with_cpumask("cpu_online_mask", vec![0, 2])
            .with_u64("nr_cpu_ids", 8);
        let cpus: Vec<u32> = enumerate_cpus(&session)
            .iter()
            .map(|k| k.value("cpu").unwrap())
            .collect();
        assert_eq!(cpus, vec![0, 2]);
    }

    #[test]
    fn cpus_fall_back_to_nr_cpu_ids_then_zero() {
        let session = MockSession::new().with_u64("nr_cpu_ids", 3);
        assert_eq!(enumerate_cpus(&session).len(), 3);

        let session = MockSession::new().with_u64("nr_cpu_ids", 0);
        assert_eq!(enumerate_cpus(&session), vec![KeySet::single("cpu", 0)]);
    }

    #[test]
    fn key_set_values_parse_or_explain() {
        let keys = KeySet::single("pid", "abc");
        assert!(keys.value::<i64>("pid").is_err());
        assert!(keys.value::<i64>("cpu").unwrap_err().to_string().contains("missing key"));
        assert_eq!(keys.to_string(), "pid=abc");
    }

    #[test]
    fn default_table_has_builtin_enumerators() {
        let table = EnumeratorTable::default();
        assert_eq!(table.names(), vec!["enumerate_cpus", "enumerate_pids"]);
        assert!(!EnumeratorTable::empty().contains("enumerate_pids"));
    }
}
