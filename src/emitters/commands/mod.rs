//! Producers for `sos_commands/`: reconstructed command output.

mod kernel;

use super::registry::ProducerModule;

/// Discovery order for the `commands` scope.
pub static MODULES: &[ProducerModule] = &[ProducerModule::new("kernel", kernel::register)];
