//! Emitters: small producers that turn session state into one text artifact.
//!
//! Producers live in per-scope modules (`proc`, `sys`, `commands`). Each
//! module registers its own producers from a `register` function, and the
//! scope's module table lists those functions in a fixed order. Adding a
//! producer never requires editing a central path map.
//!
//! Producers only return text. The [`engine`] resolves them into output
//! records and [`writer`] puts those records into the archive.

pub mod commands;
pub mod engine;
pub mod enumerate;
pub mod proc;
pub mod registry;
pub mod sys;
pub mod writer;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

pub use engine::{format_stub, Engine, OutputRecord, STUB_PREFIX};
pub use enumerate::{EnumeratorTable, KeySet};
pub use registry::{ModuleRegistrar, Producer, ProducerModule, Registry, RegistryError};

/// Output namespace a producer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Proc,
    Sys,
    Commands,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Proc => "proc",
            Scope::Sys => "sys",
            Scope::Commands => "commands",
        }
    }

    /// Top-level archive directory the scope's outputs land in.
    pub fn output_root(&self) -> &'static str {
        match self {
            Scope::Proc => "proc",
            Scope::Sys => "sys",
            Scope::Commands => "sos_commands",
        }
    }

    /// Producer modules compiled into this scope, in discovery order.
    pub fn modules(&self) -> &'static [ProducerModule] {
        match self {
            Scope::Proc => proc::MODULES,
            Scope::Sys => sys::MODULES,
            Scope::Commands => commands::MODULES,
        }
    }

    pub fn all() -> &'static [Scope] {
        &[Scope::Proc, Scope::Sys, Scope::Commands]
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proc" => Ok(Scope::Proc),
            "sys" => Ok(Scope::Sys),
            "commands" => Ok(Scope::Commands),
            other => Err(RegistryError::UnknownScope(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_parses_known_names_only() {
        assert_eq!("proc".parse::<Scope>().unwrap(), Scope::Proc);
        assert_eq!("commands".parse::<Scope>().unwrap(), Scope::Commands);
        assert!(matches!(
            "kernel".parse::<Scope>(),
            Err(RegistryError::UnknownScope(_))
        ));
    }

    #[test]
    fn every_scope_has_modules() {
        for scope in Scope::all() {
            assert!(!scope.modules().is_empty(), "{scope} has no modules");
        }
    }
}
