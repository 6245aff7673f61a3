//! `sos_commands/kernel/{uname_-a,lsmod}`.

use std::fmt::Write;

use anyhow::bail;

use crate::emitters::registry::{ModuleRegistrar, RegistryError};
use crate::session::Session;

pub(super) fn register(r: &mut ModuleRegistrar) -> Result<(), RegistryError> {
    r.emits("sos_commands/kernel/uname_-a", emit_uname_a)?;
    r.emits("sos_commands/kernel/lsmod", emit_lsmod)?;
    Ok(())
}

fn emit_uname_a(session: &dyn Session) -> anyhow::Result<String> {
    let fields = match session.utsname() {
        Ok(uts) => vec![uts.sysname, uts.nodename, uts.release, uts.version, uts.machine],
        Err(e) => {
            tracing::debug!(error = %e, "utsname unavailable, trying linux_banner");
            vec![session.symbol_string("linux_banner").unwrap_or_default()]
        }
    };
    let parts: Vec<&str> = fields
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect();
    if parts.is_empty() {
        bail!("no utsname fields available");
    }
    Ok(format!("{}\n", parts.join(" ")))
}

fn emit_lsmod(session: &dyn Session) -> anyhow::Result<String> {
    let modules = session.modules()?;
    if modules.is_empty() {
        bail!("no modules info available");
    }
    let mut out = String::from("Module                  Size  Used by\n");
    for m in &modules {
        writeln!(out, "{:<22} {:>8}  {}", m.name, m.size, m.refcnt)?;
    }
    Ok(out)
}
