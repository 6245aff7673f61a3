//! Plugins that run one emitter scope and write its records at their exact
//! paths (`proc/...`, `sys/...`, `sos_commands/...`).

use super::{Plugin, PluginContext, PluginError, PluginMeta};
use crate::emitters::Scope;
use crate::util::panics::isolate;

/// Run `scope` through the engine and write the records.
///
/// If the engine itself blows up, `ERROR.txt` in the plugin directory
/// records why and the plugin still completes.
fn collect_scope(ctx: &mut PluginContext<'_>, scope: Scope) -> Result<(), PluginError> {
    let engine = ctx.engine();
    let session = ctx.session();
    let records = match isolate(|| engine.run(scope, session)) {
        Ok(records) => records,
        Err(msg) => {
            tracing::warn!(plugin = ctx.name(), scope = %scope, error = %msg, "Emitter scope failed");
            return ctx.write_text("ERROR.txt", &format!("{scope} emitters failed: {msg}\n"));
        }
    };
    let summary = ctx.write_records(&records)?;
    tracing::info!(
        plugin = ctx.name(),
        scope = %scope,
        written = summary.written,
        stubs = summary.stubs,
        rejected = summary.rejected,
        "Wrote scope records"
    );
    Ok(())
}

/// Reconstructs the `proc/` tree.
#[derive(Debug, Default)]
pub struct VmcoreProcfs;

impl Plugin for VmcoreProcfs {
    fn collect(&mut self, ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        collect_scope(ctx, Scope::Proc)
    }
}

impl PluginMeta for VmcoreProcfs {
    const DESCRIPTION: &'static str = "Reconstruct proc/ tree from vmcore (best-effort)";
}

/// Reconstructs the `sys/` tree.
#[derive(Debug, Default)]
pub struct VmcoreSysfs;

impl Plugin for VmcoreSysfs {
    fn collect(&mut self, ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        collect_scope(ctx, Scope::Sys)
    }
}

impl PluginMeta for VmcoreSysfs {
    const DESCRIPTION: &'static str = "Reconstruct sys/ tree from vmcore (best-effort)";
}

/// Reconstructs command output under `sos_commands/`.
#[derive(Debug, Default)]
pub struct VmcoreCommands;

impl Plugin for VmcoreCommands {
    fn collect(&mut self, ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        collect_scope(ctx, Scope::Commands)
    }
}

impl PluginMeta for VmcoreCommands {
    const DESCRIPTION: &'static str = "Reconstruct sos_commands/ output from vmcore (best-effort)";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Archive;
    use crate::emitters::Engine;
    use crate::session::mock::MockSession;
    use tempfile::tempdir;

    #[test]
    fn procfs_writes_exact_paths() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::create(dir.path(), "r").unwrap();
        let session = MockSession::new()
            .with_string("saved_command_line", "ro quiet")
            .with_pid_candidates(vec![1]);
        let engine = Engine::default();
        let mut ctx = PluginContext::new("vmcore_procfs", &session, &mut archive, &engine);
        VmcoreProcfs.collect(&mut ctx).unwrap();

        let root = archive.archive_path();
        assert_eq!(std::fs::read_to_string(root.join("proc/cmdline")).unwrap(), "ro quiet\n");
        assert!(root.join("proc/1/status").exists());
        assert_eq!(std::fs::read_to_string(root.join("proc/1/oom_adj")).unwrap(), "0\n");
        assert!(!root.join("plugins/vmcore_procfs/ERROR.txt").exists());
    }

    #[test]
    fn sysfs_stubs_when_nothing_is_known() {
        let dir = tempdir().unwrap();
        let mut archive = Archive::create(dir.path(), "r").unwrap();
        let session = MockSession::new();
        let engine = Engine::default();
        let mut ctx = PluginContext::new("vmcore_sysfs", &session, &mut archive, &engine);
        VmcoreSysfs.collect(&mut ctx).unwrap();

        let online = std::fs::read_to_string(
            archive.archive_path().join("sys/devices/system/cpu/online"),
        )
        .unwrap();
        assert!(online.starts_with(crate::emitters::STUB_PREFIX));
    }
}
