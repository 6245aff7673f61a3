//! Sequential plugin execution with per-plugin fault isolation.

use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::{PluginContext, PluginDescriptor, PluginError};
use crate::archive::{Archive, ArchiveError};
use crate::emitters::Engine;
use crate::session::Session;
use crate::util::panics::isolate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum PluginStatus {
    Completed,
    Failed(String),
    Inactive,
}

impl PluginStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginStatus::Completed => "completed",
            PluginStatus::Failed(_) => "failed",
            PluginStatus::Inactive => "inactive",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PluginOutcome {
    pub name: String,
    pub status: PluginStatus,
    pub files_written: usize,
    pub duration_ms: u64,
}

/// Conditions that end the whole run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("{source} in plugin {plugin}")]
    FatalFilesystem {
        plugin: String,
        #[source]
        source: ArchiveError,
    },
    #[error("cancelled by user")]
    Cancelled,
}

enum Step {
    Done(PluginStatus),
    Fatal(ArchiveError),
}

fn classify(result: Result<(), PluginError>, phase: &str) -> Option<Step> {
    match result {
        Ok(()) => None,
        Err(PluginError::Archive(e)) if e.is_fatal() => Some(Step::Fatal(e)),
        Err(e) => Some(Step::Done(PluginStatus::Failed(format!("{phase}: {e}")))),
    }
}

fn run_one(
    plugin: &PluginDescriptor,
    session: &dyn Session,
    archive: &mut Archive,
    engine: &Engine,
) -> Step {
    let mut instance = plugin.instantiate();

    match instance.check_enabled(session) {
        Ok(true) => {}
        Ok(false) => return Step::Done(PluginStatus::Inactive),
        Err(e) => {
            tracing::debug!(plugin = %plugin.name, error = %e, "check_enabled failed");
            return Step::Done(PluginStatus::Inactive);
        }
    }

    let mut ctx = PluginContext::new(&plugin.name, session, archive, engine);
    let outcome = isolate(|| {
        if let Some(step) = classify(instance.setup(&mut ctx), "setup") {
            return step;
        }
        classify(instance.collect(&mut ctx), "collect")
            .unwrap_or(Step::Done(PluginStatus::Completed))
    });

    outcome.unwrap_or_else(|msg| Step::Done(PluginStatus::Failed(format!("panic: {msg}"))))
}

/// Run selected plugins one at a time.
///
/// `progress` is called before each plugin with its 1-based index and the
/// total. Cancellation is checked between plugins; a fatal filesystem error
/// stops the run immediately.
pub fn run_plugins(
    selected: &[PluginDescriptor],
    session: &dyn Session,
    archive: &mut Archive,
    engine: &Engine,
    cancel: &CancellationToken,
    mut progress: impl FnMut(usize, usize, &PluginDescriptor),
) -> Result<Vec<PluginOutcome>, RunError> {
    let mut outcomes = Vec::with_capacity(selected.len());
    let total = selected.len();

    for (i, plugin) in selected.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        progress(i + 1, total, plugin);

        let before = archive.write_count();
        let started = Instant::now();
        let status = match run_one(plugin, session, archive, engine) {
            Step::Done(status) => status,
            Step::Fatal(source) => {
                tracing::error!(plugin = %plugin.name, error = %source, "Fatal filesystem error");
                return Err(RunError::FatalFilesystem {
                    plugin: plugin.name.clone(),
                    source,
                });
            }
        };

        match &status {
            PluginStatus::Completed => tracing::info!(plugin = %plugin.name, "Plugin completed"),
            PluginStatus::Inactive => tracing::info!(plugin = %plugin.name, "Plugin inactive"),
            PluginStatus::Failed(e) => tracing::warn!(plugin = %plugin.name, error = %e, "Plugin failed"),
        }

        outcomes.push(PluginOutcome {
            name: plugin.name.clone(),
            status,
            files_written: archive.write_count() - before,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    if cancel.is_cancelled() {
        return Err(RunError::Cancelled);
    }
    Ok(outcomes)
}
