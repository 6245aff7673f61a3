//! `/proc/modules` reduced to `<name> <size> <refcount>`.

use anyhow::bail;

use crate::emitters::registry::{ModuleRegistrar, RegistryError};
use crate::session::Session;

pub(super) fn register(r: &mut ModuleRegistrar) -> Result<(), RegistryError> {
    r.emits("proc/modules", emit_proc_modules)?;
    Ok(())
}

fn emit_proc_modules(session: &dyn Session) -> anyhow::Result<String> {
    let modules = session.modules()?;
    if modules.is_empty() {
        bail!("no modules found");
    }
    Ok(modules
        .iter()
        .map(|m| format!("{} {} {}\n", m.name, m.size, m.refcnt))
        .collect())
}
