use crate::emitters::registry::{ModuleRegistrar, RegistryError};
use crate::session::Session;

pub(super) fn register(r: &mut ModuleRegistrar) -> Result<(), RegistryError> {
    r.emits("proc/cmdline", emit_proc_cmdline)?;
    Ok(())
}

fn emit_proc_cmdline(session: &dyn Session) -> anyhow::Result<String> {
    let cmdline = session.symbol_string("saved_command_line")?;
    Ok(format!("{}\n", cmdline.trim_end_matches('\n')))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::mock::MockSession;

    #[test]
    fn single_trailing_newline() {
        let session = MockSession::new().with_string("saved_command_line", "ro quiet\n\n");
        assert_eq!(emit_proc_cmdline(&session).unwrap(), "ro quiet\n");
    }

    #[test]
    fn missing_symbol_is_an_error() {
        assert!(emit_proc_cmdline(&MockSession::new()).is_err());
    }
}
