//! Shared test utilities for vmcore-report
//!
//! - A fake vmcore: an ELF header followed by a VMCOREINFO note
//! - A mock session populated like a small two-CPU system
//! - Helpers to read artifacts out of a report tree

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use vmcore_report::session::mock::MockSession;
use vmcore_report::session::{ModuleInfo, TaskInfo, UtsName};

pub const VMCOREINFO: &str = "OSRELEASE=6.8.0-test\n\
PAGESIZE=4096\n\
NUMBER(nr_cpu_ids)=2\n";

static VMCORE_BYTES: Lazy<Vec<u8>> = Lazy::new(|| {
    let mut bytes = b"\x7fELF\x02\x01\x01\0".to_vec();
    bytes.resize(256, 0);
    bytes.extend_from_slice(VMCOREINFO.as_bytes());
    bytes.push(0);
    bytes
});

/// Write a fake vmcore into `dir` and return its path.
pub fn fake_vmcore(dir: &Path) -> PathBuf {
    let path = dir.join("vmcore");
    fs::write(&path, VMCORE_BYTES.as_slice()).expect("Failed to write fake vmcore");
    path
}

pub fn task(pid: i64, comm: &str) -> TaskInfo {
    TaskInfo {
        pid,
        tgid: pid,
        ppid: if pid == 1 { 0 } else { 1 },
        comm: comm.to_string(),
        state: 'S',
        state_value: 1,
        ..TaskInfo::default()
    }
}

/// Two CPUs, two tasks, one module.
pub fn small_system() -> MockSession {
    MockSession::new()
        .with_u64("nr_cpu_ids", 2)
        .with_cpumask("cpu_online_mask", vec![0, 1])
        .with_cpumask("cpu_present_mask", vec![0, 1])
        .with_cpumask("cpu_possible_mask", vec![0, 1, 2, 3])
        .with_string("saved_command_line", "BOOT_IMAGE=/vmlinuz root=/dev/vda1 ro")
        .with_string("linux_banner", "Linux version 6.8.0-test (gcc)\n")
        .with_utsname(UtsName {
            sysname: "Linux".into(),
            nodename: "crashbox".into(),
            release: "6.8.0-test".into(),
            version: "#1 SMP".into(),
            machine: "x86_64".into(),
            domainname: "(none)".into(),
        })
        .with_pid_candidates(vec![1, 42])
        .with_task(task(1, "systemd"))
        .with_task(task(42, "bash"))
        .with_modules(vec![ModuleInfo {
            name: "ext4".into(),
            size: 1003520,
            refcnt: 2,
        }])
        .with_stack(42, "[<0>] do_sys_poll+0x3c0/0x560")
}

pub fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap_or_else(|e| panic!("Failed to read {rel}: {e}"))
}
