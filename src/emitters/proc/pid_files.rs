//! Per-task `/proc/<pid>/*` files.

use std::fmt::Write;

use crate::emitters::enumerate::KeySet;
use crate::emitters::registry::{ModuleRegistrar, RegistryError};
use crate::session::{Session, TaskInfo};

/// `/proc/<pid>/limits` row labels and units, indexed like `RLIMIT_*`.
pub const RLIMIT_NAMES: &[(&str, &str)] = &[
    ("Max cpu time", "seconds"),
    ("Max file size", "bytes"),
    ("Max data size", "bytes"),
    ("Max stack size", "bytes"),
    ("Max core file size", "bytes"),
    ("Max resident set", "bytes"),
    ("Max processes", "processes"),
    ("Max open files", "files"),
    ("Max locked memory", "bytes"),
    ("Max address space", "bytes"),
    ("Max file locks", "locks"),
    ("Max pending signals", "signals"),
    ("Max msgqueue size", "bytes"),
    ("Max nice priority", ""),
    ("Max realtime priority", ""),
    ("Max realtime timeout", "us"),
];

const STACK_UNAVAILABLE: &str = "Stack trace not available\n";

pub(super) fn register(r: &mut ModuleRegistrar) -> Result<(), RegistryError> {
    r.emits_many("proc/{pid}/status", "enumerate_pids", emit_proc_pid_status)?;
    r.emits_many("proc/{pid}/limits", "enumerate_pids", emit_proc_pid_limits)?;
    r.emits_many("proc/{pid}/oom_adj", "enumerate_pids", emit_proc_pid_oom_adj)?;
    r.emits_many("proc/{pid}/oom_score", "enumerate_pids", emit_proc_pid_oom_score)?;
    r.emits_many(
        "proc/{pid}/oom_score_adj",
        "enumerate_pids",
        emit_proc_pid_oom_score_adj,
    )?;
    r.emits_many("proc/{pid}/stack", "enumerate_pids", emit_proc_pid_stack)?;
    Ok(())
}

fn task(session: &dyn Session, keys: &KeySet) -> anyhow::Result<TaskInfo> {
    Ok(session.find_task(keys.value("pid")?)?)
}

fn emit_proc_pid_status(session: &dyn Session, keys: &KeySet) -> anyhow::Result<String> {
    let t = task(session, keys)?;
    let mut out = String::new();
    writeln!(out, "Name:\t{}", t.comm.trim())?;
    writeln!(out, "Umask:\t0000")?;
    writeln!(out, "State:\t{} ({})", t.state, t.state_value)?;
    writeln!(out, "Tgid:\t{}", t.tgid)?;
    writeln!(out, "Ngid:\t0")?;
    writeln!(out, "Pid:\t{}", t.pid)?;
    writeln!(out, "PPid:\t{}", t.ppid)?;
    writeln!(out, "TracerPid:\t{}", t.tracer_pid)?;
    let [uid, euid, suid, fsuid] = t.uid;
    writeln!(out, "Uid:\t{uid}\t{euid}\t{suid}\t{fsuid}")?;
    let [gid, egid, sgid, fsgid] = t.gid;
    writeln!(out, "Gid:\t{gid}\t{egid}\t{sgid}\t{fsgid}")?;
    writeln!(out, "Groups:")?;
    writeln!(out, "NStgid:\t{}", t.pid)?;
    writeln!(out, "NSpid:\t{}", t.pid)?;
    writeln!(out, "Kthread:\t{}", u8::from(t.kthread))?;
    writeln!(out, "Threads:\t1")?;
    Ok(out)
}

fn limit(v: u64) -> String {
    if v >= 1 << 63 {
        "unlimited".to_string()
    } else {
        v.to_string()
    }
}

fn limits_header() -> String {
    format!(
        "{:<25} {:<20} {:<20} {:<15}\n",
        "Limit", "Soft Limit", "Hard Limit", "Units"
    )
}

fn emit_proc_pid_limits(session: &dyn Session, keys: &KeySet) -> anyhow::Result<String> {
    let t = task(session, keys)?;
    let mut out = limits_header();
    for ((name, unit), (soft, hard)) in RLIMIT_NAMES.iter().zip(&t.rlimits) {
        writeln!(
            out,
            "{:<25} {:<20} {:<20} {:<15}",
            name,
            limit(*soft),
            limit(*hard),
            unit
        )?;
    }
    Ok(out)
}

/// Deprecated interface; modern kernels always report 0.
fn emit_proc_pid_oom_adj(_session: &dyn Session, _keys: &KeySet) -> anyhow::Result<String> {
    Ok("0\n".to_string())
}

fn emit_proc_pid_oom_score(session: &dyn Session, keys: &KeySet) -> anyhow::Result<String> {
    let adj = task(session, keys)?.oom_score_adj.unwrap_or(0);
    Ok(format!("{}\n", adj * 1000))
}

fn emit_proc_pid_oom_score_adj(session: &dyn Session, keys: &KeySet) -> anyhow::Result<String> {
    let adj = task(session, keys)?.oom_score_adj.unwrap_or(0);
    Ok(format!("{adj}\n"))
}

fn emit_proc_pid_stack(session: &dyn Session, keys: &KeySet) -> anyhow::Result<String> {
    let pid: i64 = keys.value("pid")?;
    match session.stack_trace(pid) {
        Ok(trace) if trace.ends_with('\n') => Ok(trace),
        Ok(trace) => Ok(trace + "\n"),
        Err(e) => {
            tracing::debug!(pid, error = %e, "Stack trace unavailable");
            Ok(STACK_UNAVAILABLE.to_string())
        }
    }
}
