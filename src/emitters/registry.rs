//! Producer registry and discovery.
//!
//! Producer modules declare their producers through a [`ModuleRegistrar`]:
//!
//! ```
//! use vmcore_report::emitters::{KeySet, ModuleRegistrar, RegistryError};
//! use vmcore_report::session::Session;
//!
//! fn emit_cmdline(session: &dyn Session) -> anyhow::Result<String> {
//!     Ok(session.symbol_string("saved_command_line")? + "\n")
//! }
//!
//! fn emit_status(_session: &dyn Session, keys: &KeySet) -> anyhow::Result<String> {
//!     Ok(format!("Pid:\t{}\n", keys.value::<i64>("pid")?))
//! }
//!
//! pub fn register(r: &mut ModuleRegistrar) -> Result<(), RegistryError> {
//!     r.emits("proc/cmdline", emit_cmdline)?;
//!     r.emits_many("proc/{pid}/status", "enumerate_pids", emit_status)?;
//!     Ok(())
//! }
//! ```
//!
//! Discovery walks a scope's module table in order. A module whose
//! registration fails is skipped as a whole and never aborts the rest of
//! the scope.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::enumerate::KeySet;
use super::Scope;
use crate::session::Session;

/// Body of a fixed-path producer.
pub type FixedBody = Arc<dyn Fn(&dyn Session) -> anyhow::Result<String> + Send + Sync>;

/// Body of a templated-path producer, called once per key-set.
pub type TemplatedBody =
    Arc<dyn Fn(&dyn Session, &KeySet) -> anyhow::Result<String> + Send + Sync>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid scope: {0}")]
    UnknownScope(String),
    #[error("invalid output path '{0}': must be a non-empty relative path")]
    InvalidPath(String),
    #[error("invalid path template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },
    #[error("{0}")]
    Module(String),
}

/// A registered producer.
#[derive(Clone)]
pub enum Producer {
    Fixed {
        name: String,
        path: String,
        body: FixedBody,
    },
    Templated {
        name: String,
        template: String,
        enumerator: String,
        body: TemplatedBody,
    },
}

impl Producer {
    /// Function name the producer was declared with, for logs.
    pub fn name(&self) -> &str {
        match self {
            Producer::Fixed { name, .. } | Producer::Templated { name, .. } => name,
        }
    }

    /// The fixed path or the unrendered template.
    pub fn path(&self) -> &str {
        match self {
            Producer::Fixed { path, .. } => path,
            Producer::Templated { template, .. } => template,
        }
    }

    pub fn enumerator(&self) -> Option<&str> {
        match self {
            Producer::Fixed { .. } => None,
            Producer::Templated { enumerator, .. } => Some(enumerator),
        }
    }
}

impl fmt::Debug for Producer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Producer");
        s.field("name", &self.name()).field("path", &self.path());
        if let Some(e) = self.enumerator() {
            s.field("enumerator", &e);
        }
        s.finish()
    }
}

/// Registration entry point of one producer module.
pub type RegisterFn = fn(&mut ModuleRegistrar) -> Result<(), RegistryError>;

/// A producer module as listed in a scope's module table.
#[derive(Clone, Copy)]
pub struct ProducerModule {
    pub name: &'static str,
    pub register: RegisterFn,
}

impl ProducerModule {
    pub const fn new(name: &'static str, register: RegisterFn) -> Self {
        Self { name, register }
    }
}

impl fmt::Debug for ProducerModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProducerModule")
            .field("name", &self.name)
            .finish()
    }
}

/// Collects the producers a single module declares.
#[derive(Debug, Default)]
pub struct ModuleRegistrar {
    producers: Vec<Producer>,
}

impl ModuleRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a fixed-path producer.
    pub fn emits<F>(&mut self, path: &str, body: F) -> Result<&mut Self, RegistryError>
    where
        F: Fn(&dyn Session) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        validate_path(path)?;
        if path.contains(['{', '}']) {
            return Err(RegistryError::InvalidTemplate {
                template: path.to_string(),
                reason: "fixed paths cannot contain placeholders".to_string(),
            });
        }
        self.producers.push(Producer::Fixed {
            name: fn_name(&body),
            path: path.to_string(),
            body: Arc::new(body),
        });
        Ok(self)
    }

    /// Declare a templated-path producer driven by the named enumerator.
    ///
    /// The enumerator name is resolved at run time, so an unknown name is
    /// accepted here and degrades to a stub when the scope runs.
    pub fn emits_many<F>(
        &mut self,
        template: &str,
        enumerator: &str,
        body: F,
    ) -> Result<&mut Self, RegistryError>
    where
        F: Fn(&dyn Session, &KeySet) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        validate_path(template)?;
        let placeholders = super::engine::placeholders(template).map_err(|reason| {
            RegistryError::InvalidTemplate {
                template: template.to_string(),
                reason,
            }
        })?;
        if placeholders.is_empty() {
            return Err(RegistryError::InvalidTemplate {
                template: template.to_string(),
                reason: "no placeholders".to_string(),
            });
        }
        self.producers.push(Producer::Templated {
            name: fn_name(&body),
            template: template.to_string(),
            enumerator: enumerator.to_string(),
            body: Arc::new(body),
        });
        Ok(self)
    }

    pub fn into_producers(self) -> Vec<Producer> {
        self.producers
    }
}

/// Short name of a function item, e.g. `emit_proc_cmdline`.
fn fn_name<F>(f: &F) -> String {
    let full = std::any::type_name_of_val(f);
    full.rsplit("::")
        .find(|seg| !seg.starts_with('{'))
        .unwrap_or(full)
        .to_string()
}

fn validate_path(path: &str) -> Result<(), RegistryError> {
    if path.trim().is_empty() || path.starts_with('/') || path.split('/').any(|c| c == "..") {
        return Err(RegistryError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// The producers discovered for one scope.
#[derive(Debug, Clone)]
pub struct Registry {
    scope: Scope,
    producers: Vec<Producer>,
}

impl Registry {
    /// Discover every producer compiled into `scope`.
    pub fn discover(scope: Scope) -> Self {
        Self::from_modules(scope, scope.modules())
    }

    /// Build a registry from an explicit module table.
    ///
    /// Order is module order, then declaration order within each module.
    /// The first producer to claim a fixed path keeps it; later claims in the
    /// same scope are dropped with a warning.
    pub fn from_modules(scope: Scope, modules: &[ProducerModule]) -> Self {
        let mut producers = Vec::new();
        let mut fixed_paths = HashSet::new();

        for module in modules {
            let mut registrar = ModuleRegistrar::new();
            if let Err(e) = (module.register)(&mut registrar) {
                tracing::warn!(
                    scope = %scope,
                    module = module.name,
                    error = %e,
                    "Producer module does not register, skipping"
                );
                continue;
            }

            for producer in registrar.into_producers() {
                if let Producer::Fixed { path, name, .. } = &producer {
                    if !fixed_paths.insert(path.clone()) {
                        tracing::warn!(
                            scope = %scope,
                            module = module.name,
                            producer = %name,
                            path = %path,
                            "Duplicate fixed path, keeping the first producer"
                        );
                        continue;
                    }
                }
                producers.push(producer);
            }
        }

        tracing::debug!(scope = %scope, producers = producers.len(), "Discovered producers");
        Self { scope, producers }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn producers(&self) -> &[Producer] {
        &self.producers
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }
}

/// List the producers discovered for a scope.
pub fn discover(scope: Scope) -> Vec<Producer> {
    Registry::discover(scope).producers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit_a(_: &dyn Session) -> anyhow::Result<String> {
        Ok("a\n".into())
    }

    fn emit_b(_: &dyn Session) -> anyhow::Result<String> {
        Ok("b\n".into())
    }

    fn emit_each(_: &dyn Session, _: &KeySet) -> anyhow::Result<String> {
        Ok("each\n".into())
    }

    fn good(r: &mut ModuleRegistrar) -> Result<(), RegistryError> {
        r.emits("proc/a", emit_a)?;
        r.emits_many("proc/{pid}/each", "enumerate_pids", emit_each)?;
        Ok(())
    }

    fn broken(r: &mut ModuleRegistrar) -> Result<(), RegistryError> {
        r.emits("proc/b", emit_b)?;
        r.emits("/absolute", emit_b)?;
        Ok(())
    }

    fn duplicate(r: &mut ModuleRegistrar) -> Result<(), RegistryError> {
        r.emits("proc/a", emit_b)?;
        r.emits("proc/b", emit_b)?;
        Ok(())
    }

    #[test]
    fn producers_keep_their_function_names() {
        let mut r = ModuleRegistrar::new();
        r.emits("proc/a", emit_a).unwrap();
        let producers = r.into_producers();
        assert_eq!(producers[0].name(), "emit_a");
    }

    #[test]
    fn broken_module_is_skipped_without_affecting_others() {
        let modules = [
            ProducerModule::new("broken", broken),
            ProducerModule::new("good", good),
        ];
        let registry = Registry::from_modules(Scope::Proc, &modules);
        let paths: Vec<&str> = registry.producers().iter().map(Producer::path).collect();
        assert_eq!(paths, vec!["proc/a", "proc/{pid}/each"]);
    }

    #[test]
    fn first_fixed_path_wins() {
        let modules = [
            ProducerModule::new("good", good),
            ProducerModule::new("duplicate", duplicate),
        ];
        let registry = Registry::from_modules(Scope::Proc, &modules);
        let names: Vec<&str> = registry.producers().iter().map(Producer::name).collect();
        assert_eq!(names, vec!["emit_a", "emit_each", "emit_b"]);
        assert_eq!(registry.producers()[2].path(), "proc/b");
    }

    #[test]
    fn discovery_is_repeatable() {
        for scope in Scope::all() {
            let first: Vec<String> = discover(*scope).iter().map(|p| p.path().to_string()).collect();
            let second: Vec<String> = discover(*scope).iter().map(|p| p.path().to_string()).collect();
            assert_eq!(first, second);
            assert!(!first.is_empty());
        }
    }

    #[test]
    fn templates_are_validated() {
        let mut r = ModuleRegistrar::new();
        assert!(matches!(
            r.emits_many("proc/status", "enumerate_pids", emit_each),
            Err(RegistryError::InvalidTemplate { .. })
        ));
        assert!(matches!(
            r.emits_many("proc/{pid/status", "enumerate_pids", emit_each),
            Err(RegistryError::InvalidTemplate { .. })
        ));
        assert!(matches!(
            r.emits("proc/{pid}", emit_a),
            Err(RegistryError::InvalidTemplate { .. })
        ));
        assert!(matches!(
            r.emits("../escape", emit_a),
            Err(RegistryError::InvalidPath(_))
        ));
    }
}
