//! Best-effort `/proc/cpuinfo` with one stanza per CPU.
//!
//! Vendor and model strings are not recoverable from a dump, so the file
//! always carries the partial-data header.

use std::fmt::Write;

use crate::emitters::enumerate::enumerate_cpus;
use crate::emitters::registry::{ModuleRegistrar, RegistryError};
use crate::session::Session;

const PARTIAL_HEADER: &str = "# vmcore-report: partial /proc/cpuinfo (best-effort)\n";
const UNKNOWN: &str = "unknown";

pub(super) fn register(r: &mut ModuleRegistrar) -> Result<(), RegistryError> {
    r.emits("proc/cpuinfo", emit_proc_cpuinfo)?;
    Ok(())
}

fn emit_proc_cpuinfo(session: &dyn Session) -> anyhow::Result<String> {
    let arch = session
        .utsname()
        .ok()
        .map(|uts| uts.machine.trim().to_string())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string());

    let mut out = String::from(PARTIAL_HEADER);
    for keys in enumerate_cpus(session) {
        let cpu: u32 = keys.value("cpu")?;
        writeln!(out, "processor\t: {cpu}")?;
        writeln!(out, "architecture\t: {arch}")?;
        writeln!(out, "vendor_id\t: {UNKNOWN}")?;
        writeln!(out, "model name\t: {UNKNOWN}")?;
        out.push('\n');
    }
    Ok(out)
}
