//! Execution engine: resolves a scope's producers into output records.
//!
//! Every producer invocation yields exactly one record. Errors and panics in
//! a body turn into a stub for that invocation only.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::enumerate::{EnumeratorTable, KeySet};
use super::registry::{Producer, Registry};
use super::Scope;
use crate::session::Session;
use crate::util::panics::isolate;

/// Sentinel every stub artifact starts with.
pub const STUB_PREFIX: &str = "# vmcore-report: stub";

/// One `(relative path, text)` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputRecord {
    pub path: String,
    pub text: String,
}

impl OutputRecord {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    pub fn is_stub(&self) -> bool {
        self.text.starts_with(STUB_PREFIX)
    }
}

pub fn format_stub(reason: &str) -> String {
    format!("{STUB_PREFIX} (not reconstructable from vmcore) - {reason}\n")
}

/// Names of the `{placeholder}`s in a template, in order.
///
/// Fails on unbalanced or empty braces.
pub fn placeholders(template: &str) -> Result<Vec<String>, String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find(['{', '}']) {
        if rest.as_bytes()[open] == b'}' {
            return Err("unmatched '}'".to_string());
        }
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| "unclosed '{'".to_string())?;
        let name = &after[..close];
        if name.is_empty() || name.contains('{') {
            return Err(format!("bad placeholder '{{{name}}}'"));
        }
        names.push(name.to_string());
        rest = &after[close + 1..];
    }
    Ok(names)
}

/// Substitute key values into a template.
pub fn render(template: &str, keys: &KeySet) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find(['{', '}']) {
        if rest.as_bytes()[open] == b'}' {
            return Err("unmatched '}'".to_string());
        }
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| "unclosed '{'".to_string())?;
        let name = &after[..close];
        let value = keys
            .get(name)
            .ok_or_else(|| format!("no value for '{name}'"))?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Template with braces neutralized, used when rendering is impossible.
pub fn sanitize_template(template: &str) -> String {
    template.replace(['{', '}'], "_")
}

/// Runs producers against a session with a fixed enumerator table.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    enumerators: EnumeratorTable,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(enumerators: EnumeratorTable) -> Self {
        Self {
            enumerators,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop starting new producers once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn enumerators(&self) -> &EnumeratorTable {
        &self.enumerators
    }

    /// Discover and run every producer in `scope`.
    pub fn run(&self, scope: Scope, session: &dyn Session) -> Vec<OutputRecord> {
        self.run_registry(&Registry::discover(scope), session)
    }

    pub fn run_registry(&self, registry: &Registry, session: &dyn Session) -> Vec<OutputRecord> {
        let mut records = Vec::new();
        for producer in registry.producers() {
            if self.cancel.is_cancelled() {
                tracing::info!(scope = %registry.scope(), "Cancelled, not starting further producers");
                break;
            }
            self.run_producer(producer, session, &mut records);
        }
        let stubs = records.iter().filter(|r| r.is_stub()).count();
        tracing::info!(
            scope = %registry.scope(),
            records = records.len(),
            stubs,
            "Scope resolved"
        );
        records
    }

    /// Append the records of one producer.
    pub fn run_producer(
        &self,
        producer: &Producer,
        session: &dyn Session,
        records: &mut Vec<OutputRecord>,
    ) {
        match producer {
            Producer::Fixed { name, path, body } => {
                let text = match isolate(|| body(session)) {
                    Ok(Ok(text)) => text,
                    Ok(Err(e)) => {
                        tracing::debug!(producer = %name, path = %path, error = %e, "Producer failed");
                        format_stub(&format!("emitter failure: {e:#}"))
                    }
                    Err(msg) => {
                        tracing::debug!(producer = %name, path = %path, panic = %msg, "Producer panicked");
                        format_stub(&format!("emitter failure: {msg}"))
                    }
                };
                records.push(OutputRecord::new(path.clone(), text));
            }
            Producer::Templated {
                name,
                template,
                enumerator,
                body,
            } => {
                let Some(enumerate) = self.enumerators.get(enumerator) else {
                    tracing::debug!(producer = %name, enumerator = %enumerator, "Unknown enumerator");
                    records.push(OutputRecord::new(
                        sanitize_template(template),
                        format_stub(&format!("enumerator '{enumerator}' not found")),
                    ));
                    return;
                };

                let key_sets = match isolate(|| enumerate(session)) {
                    Ok(keys) => keys,
                    Err(msg) => {
                        tracing::debug!(producer = %name, enumerator = %enumerator, panic = %msg, "Enumerator panicked");
                        records.push(OutputRecord::new(
                            sanitize_template(template),
                            format_stub(&format!("enumerator '{enumerator}' failed: {msg}")),
                        ));
                        return;
                    }
                };

                for keys in &key_sets {
                    let path = render(template, keys).unwrap_or_else(|e| {
                        tracing::debug!(template = %template, keys = %keys, error = %e, "Template render failed");
                        sanitize_template(template)
                    });
                    let text = match isolate(|| body(session, keys)) {
                        Ok(Ok(text)) => text,
                        Ok(Err(e)) => {
                            tracing::debug!(producer = %name, path = %path, error = %e, "Producer failed");
                            format_stub(&format!("emitter error: {e:#}"))
                        }
                        Err(msg) => {
                            tracing::debug!(producer = %name, path = %path, panic = %msg, "Producer panicked");
                            format_stub(&format!("emitter error: {msg}"))
                        }
                    };
                    records.push(OutputRecord::new(path, text));
                }
            }
        }
    }
}
