//! Producers for the `sys/` tree.

mod cpu_masks;

use super::registry::ProducerModule;

pub use cpu_masks::format_cpu_list;

/// Discovery order for the `sys` scope.
pub static MODULES: &[ProducerModule] = &[ProducerModule::new("cpu_masks", cpu_masks::register)];
