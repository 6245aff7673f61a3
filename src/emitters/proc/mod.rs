//! Producers for the `proc/` tree.

mod cmdline;
mod cpuinfo;
mod modules;
mod pid_files;

use super::registry::ProducerModule;

pub use pid_files::RLIMIT_NAMES;

/// Discovery order for the `proc` scope.
pub static MODULES: &[ProducerModule] = &[
    ProducerModule::new("cmdline", cmdline::register),
    ProducerModule::new("cpuinfo", cpuinfo::register),
    ProducerModule::new("modules", modules::register),
    ProducerModule::new("pid_files", pid_files::register),
];
