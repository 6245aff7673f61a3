//! Plugin selection from user intent.
//!
//! Rules, first match wins:
//! 1. `only` is non-empty and the plugin is not in it: not specified
//! 2. the plugin is in `skip`: skipped
//! 3. experimental, no `--experimental`, not named in `enable`/`only`: experimental
//! 4. not enabled by default and not named in `enable`/`only`: optional

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use super::PluginDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotSpecified,
    Skipped,
    Experimental,
    Optional,
    Inactive,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotSpecified => "not specified",
            SkipReason::Skipped => "skipped",
            SkipReason::Experimental => "experimental",
            SkipReason::Optional => "optional",
            SkipReason::Inactive => "inactive",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Selected,
    Skipped(SkipReason),
}

/// Normalized user intent. Built once, never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    only: BTreeSet<String>,
    skip: BTreeSet<String>,
    enable: BTreeSet<String>,
    experimental: bool,
}

/// Split comma lists, trim, and keep the part before the first `.`.
pub fn normalize_names<I, S>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .flat_map(|v| {
            v.as_ref()
                .split(',')
                .map(|name| name.split('.').next().unwrap_or("").trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

impl Selection {
    /// `legacy` is the old `--plugins` list, merged into `only`.
    pub fn new<S: AsRef<str>>(
        only: &[S],
        legacy: &[S],
        skip: &[S],
        enable: &[S],
        experimental: bool,
    ) -> Self {
        let mut only_set = normalize_names(only);
        only_set.extend(normalize_names(legacy));
        Self {
            only: only_set,
            skip: normalize_names(skip),
            enable: normalize_names(enable),
            experimental,
        }
    }

    pub fn only(&self) -> &BTreeSet<String> {
        &self.only
    }

    pub fn skip(&self) -> &BTreeSet<String> {
        &self.skip
    }

    pub fn enable(&self) -> &BTreeSet<String> {
        &self.enable
    }

    pub fn experimental(&self) -> bool {
        self.experimental
    }

    pub fn decide(&self, plugin: &PluginDescriptor) -> Decision {
        let name = plugin.name.as_str();
        let named = self.enable.contains(name) || self.only.contains(name);

        if !self.only.is_empty() && !self.only.contains(name) {
            Decision::Skipped(SkipReason::NotSpecified)
        } else if self.skip.contains(name) {
            Decision::Skipped(SkipReason::Skipped)
        } else if plugin.experimental && !self.experimental && !named {
            Decision::Skipped(SkipReason::Experimental)
        } else if !plugin.default_enabled && !named {
            Decision::Skipped(SkipReason::Optional)
        } else {
            Decision::Selected
        }
    }

    /// Requested names that match no discovered plugin, sorted.
    pub fn unknown_names(&self, discovered: &[PluginDescriptor]) -> Vec<String> {
        let known: BTreeSet<&str> = discovered.iter().map(|p| p.name.as_str()).collect();
        self.only
            .iter()
            .chain(&self.skip)
            .chain(&self.enable)
            .filter(|n| !known.contains(n.as_str()))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectionResult {
    pub selected: Vec<PluginDescriptor>,
    pub skipped: Vec<(PluginDescriptor, SkipReason)>,
    pub unknown: Vec<String>,
}

/// Partition discovered plugins, keeping discovery order in both halves.
pub fn select(discovered: Vec<PluginDescriptor>, selection: &Selection) -> SelectionResult {
    let unknown = selection.unknown_names(&discovered);
    for name in &unknown {
        tracing::warn!("Requested plugin '{name}' not found");
    }

    let mut result = SelectionResult {
        unknown,
        ..SelectionResult::default()
    };
    for plugin in discovered {
        match selection.decide(&plugin) {
            Decision::Selected => result.selected.push(plugin),
            Decision::Skipped(reason) => {
                tracing::debug!(plugin = %plugin.name, reason = %reason, "Plugin skipped");
                result.skipped.push((plugin, reason));
            }
        }
    }
    result
}
