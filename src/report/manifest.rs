//! `sos_reports/manifest.json`: what ran, how, and with what result.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::archive::Compression;
use crate::emitters::{Registry, Scope};
use crate::plugins::{PluginOutcome, Selection, SelectionResult};

pub const MANIFEST_PATH: &str = "sos_reports/manifest.json";

#[derive(Debug, Serialize)]
pub struct Manifest {
    pub version: &'static str,
    pub run_id: Uuid,
    pub start_time: String,
    pub end_time: String,
    pub options: ManifestOptions,
    pub session: ManifestSession,
    pub plugins: ManifestPlugins,
    /// Producers discovered per scope.
    pub producers: BTreeMap<Scope, usize>,
    /// Files present under each scope's output root when the run ended.
    pub records: BTreeMap<Scope, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestOptions {
    pub vmcore: PathBuf,
    pub vmlinux: Option<PathBuf>,
    pub debuginfo_dirs: Vec<PathBuf>,
    pub label: Option<String>,
    pub build: bool,
    pub compression: Compression,
    pub selection: Selection,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestSession {
    pub backend: String,
    pub debug_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedPlugin {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestPlugins {
    pub selected: Vec<String>,
    pub skipped: Vec<SkippedPlugin>,
    pub unknown: Vec<String>,
    pub outcomes: Vec<PluginOutcome>,
}

impl ManifestPlugins {
    pub fn new(selection: &SelectionResult, outcomes: &[PluginOutcome]) -> Self {
        Self {
            selected: selection.selected.iter().map(|p| p.name.clone()).collect(),
            skipped: selection
                .skipped
                .iter()
                .map(|(p, reason)| SkippedPlugin {
                    name: p.name.clone(),
                    reason: reason.to_string(),
                })
                .collect(),
            unknown: selection.unknown.clone(),
            outcomes: outcomes.to_vec(),
        }
    }
}

impl Manifest {
    pub fn new(
        run_id: Uuid,
        started: DateTime<Utc>,
        options: ManifestOptions,
        session: ManifestSession,
        plugins: ManifestPlugins,
        records: BTreeMap<Scope, usize>,
    ) -> Self {
        let producers = Scope::all()
            .iter()
            .map(|scope| (*scope, Registry::discover(*scope).len()))
            .collect();
        Self {
            version: env!("CARGO_PKG_VERSION"),
            run_id,
            start_time: started.to_rfc3339(),
            end_time: Utc::now().to_rfc3339(),
            options,
            session,
            plugins,
            producers,
            records,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{discover, select, PluginStatus};

    #[test]
    fn manifest_records_selection_and_outcomes() {
        let selection = Selection::new(&["kernel_info"], &[], &[], &[], false);
        let result = select(discover(), &selection);
        let outcomes = vec![PluginOutcome {
            name: "kernel_info".into(),
            status: PluginStatus::Failed("collect: boom".into()),
            files_written: 1,
            duration_ms: 3,
        }];
        let manifest = Manifest::new(
            Uuid::new_v4(),
            Utc::now(),
            ManifestOptions {
                vmcore: PathBuf::from("/var/crash/vmcore"),
                vmlinux: None,
                debuginfo_dirs: Vec::new(),
                label: Some("case1".into()),
                build: false,
                compression: Compression::Deflated,
                selection,
            },
            ManifestSession {
                backend: "mock".into(),
                debug_files: Vec::new(),
            },
            ManifestPlugins::new(&result, &outcomes),
            BTreeMap::from([(Scope::Proc, 12)]),
        );

        let json: serde_json::Value = serde_json::from_str(&manifest.to_json().unwrap()).unwrap();
        assert_eq!(json["plugins"]["selected"][0], "kernel_info");
        assert_eq!(json["plugins"]["skipped"][0]["reason"], "not specified");
        assert_eq!(json["plugins"]["outcomes"][0]["status"]["status"], "failed");
        assert_eq!(json["plugins"]["outcomes"][0]["status"]["error"], "collect: boom");
        assert_eq!(json["options"]["compression"], "deflated");
        assert!(json["producers"]["proc"].as_u64().unwrap() > 0);
        assert_eq!(json["records"]["proc"], 12);
    }
}
