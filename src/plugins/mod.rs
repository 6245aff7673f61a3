//! Coarse-grained collection units.
//!
//! A plugin is a type implementing [`Plugin`] plus [`PluginMeta`]. Plugins
//! are listed in a static catalog; each run instantiates the selected ones
//! once, calls `check_enabled`, `setup`, then `collect`, and drops them.
//! Everything a plugin writes lands under `plugins/<name>/` unless it writes
//! engine records, which keep their exact paths.

pub mod kernel_info;
pub mod runner;
pub mod scopes;
pub mod selection;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::archive::{Archive, ArchiveError, DEFAULT_FILE_MODE};
use crate::emitters::writer::{write_records, WriteSummary};
use crate::emitters::{Engine, OutputRecord};
use crate::session::{ReadError, Session};

pub use kernel_info::KernelInfo;
pub use runner::{run_plugins, PluginOutcome, PluginStatus, RunError};
pub use scopes::{VmcoreCommands, VmcoreProcfs, VmcoreSysfs};
pub use selection::{select, Decision, Selection, SelectionResult, SkipReason};

/// Plugin modules that used to ship and are no longer loaded.
pub const RETIRED: &[&str] = &["sched_debug"];

#[derive(Error, Debug)]
pub enum PluginError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PluginError {
    /// Whether the error means no further output can be written.
    pub fn is_fatal(&self) -> bool {
        match self {
            PluginError::Archive(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Everything a plugin sees while it runs.
pub struct PluginContext<'a> {
    name: &'a str,
    outdir: String,
    session: &'a dyn Session,
    archive: &'a mut Archive,
    engine: &'a Engine,
}

impl<'a> PluginContext<'a> {
    pub fn new(
        name: &'a str,
        session: &'a dyn Session,
        archive: &'a mut Archive,
        engine: &'a Engine,
    ) -> Self {
        Self {
            name,
            outdir: output_dir(name),
            session,
            archive,
            engine,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// `plugins/<name>`
    pub fn outdir(&self) -> &str {
        &self.outdir
    }

    pub fn session(&self) -> &'a dyn Session {
        self.session
    }

    pub fn engine(&self) -> &'a Engine {
        self.engine
    }

    fn join(&self, rel: &str) -> String {
        format!("{}/{}", self.outdir, rel.trim_start_matches('/'))
    }

    /// Write text under the plugin's output directory.
    pub fn write_text(&mut self, rel: &str, content: &str) -> Result<(), PluginError> {
        let dest = self.join(rel);
        self.archive.add_string(content, &dest, DEFAULT_FILE_MODE)?;
        tracing::debug!(plugin = self.name, path = %dest, "Wrote plugin output");
        Ok(())
    }

    /// Write a value as pretty-printed JSON.
    pub fn write_json<T: Serialize + ?Sized>(&mut self, rel: &str, value: &T) -> Result<(), PluginError> {
        let text = serde_json::to_string_pretty(value)?;
        self.write_text(rel, &text)
    }

    /// Write lines, terminating each with a newline if it lacks one.
    pub fn write_lines<I, S>(&mut self, rel: &str, lines: I) -> Result<(), PluginError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        for line in lines {
            let line = line.as_ref();
            text.push_str(line);
            if !line.ends_with('\n') {
                text.push('\n');
            }
        }
        self.write_text(rel, &text)
    }

    /// Write engine records at their exact archive paths.
    pub fn write_records(&mut self, records: &[OutputRecord]) -> Result<WriteSummary, PluginError> {
        Ok(write_records(self.archive, records)?)
    }
}

/// Runtime behavior of a plugin.
pub trait Plugin {
    /// Decide whether this snapshot is relevant. `false` marks the plugin
    /// inactive.
    fn check_enabled(&self, _session: &dyn Session) -> Result<bool, PluginError> {
        Ok(true)
    }

    fn setup(&mut self, _ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    fn collect(&mut self, ctx: &mut PluginContext<'_>) -> Result<(), PluginError>;
}

/// Static metadata of a plugin type.
pub trait PluginMeta: Plugin + Default + 'static {
    /// Overrides the name derived from the type name.
    const NAME: Option<&'static str> = None;
    const DESCRIPTION: &'static str = "No description provided";
    const DEFAULT_ENABLED: bool = true;
    const EXPERIMENTAL: bool = false;
}

/// A discovered plugin: metadata plus a constructor.
#[derive(Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub description: &'static str,
    pub default_enabled: bool,
    pub experimental: bool,
    /// Module the plugin ships in, used for retirement.
    pub module: &'static str,
    factory: fn() -> Box<dyn Plugin>,
}

fn make<P: PluginMeta>() -> Box<dyn Plugin> {
    Box::new(P::default())
}

impl PluginDescriptor {
    pub fn of<P: PluginMeta>(module: &'static str) -> Self {
        let name = match P::NAME {
            Some(name) => name.to_string(),
            None => {
                let full = std::any::type_name::<P>();
                snake_case(full.rsplit("::").next().unwrap_or(full))
            }
        };
        Self {
            name,
            description: P::DESCRIPTION,
            default_enabled: P::DEFAULT_ENABLED,
            experimental: P::EXPERIMENTAL,
            module,
            factory: make::<P>,
        }
    }

    pub fn instantiate(&self) -> Box<dyn Plugin> {
        (self.factory)()
    }

    pub fn output_dir(&self) -> String {
        output_dir(&self.name)
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("module", &self.module)
            .field("default_enabled", &self.default_enabled)
            .field("experimental", &self.experimental)
            .finish()
    }
}

pub fn output_dir(name: &str) -> String {
    format!("plugins/{name}")
}

/// `VmcoreProcfs` -> `vmcore_procfs`, `HTTPServer` -> `http_server`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev != '_'
                && (prev.is_lowercase() || prev.is_ascii_digit() || (next_lower && prev.is_uppercase()))
            {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Every plugin compiled into the binary, retired ones included.
pub fn builtin_catalog() -> Vec<PluginDescriptor> {
    vec![
        PluginDescriptor::of::<KernelInfo>("kernel_info"),
        PluginDescriptor::of::<VmcoreCommands>("vmcore_commands"),
        PluginDescriptor::of::<VmcoreProcfs>("vmcore_procfs"),
        PluginDescriptor::of::<VmcoreSysfs>("vmcore_sysfs"),
    ]
}

/// Plugins eligible for selection, in catalog order.
pub fn discover() -> Vec<PluginDescriptor> {
    discover_from(builtin_catalog())
}

pub fn discover_from(catalog: Vec<PluginDescriptor>) -> Vec<PluginDescriptor> {
    catalog
        .into_iter()
        .filter(|p| {
            let retired = RETIRED.contains(&p.module);
            if retired {
                tracing::debug!(plugin = %p.name, module = p.module, "Skipping retired plugin module");
            }
            !retired
        })
        .collect()
}
