//! Integration tests for plugin selection
//!
//! Property tests over arbitrary only/skip/enable combinations.

use proptest::prelude::*;
use vmcore_report::plugins::{
    discover, discover_from, select, Decision, Plugin, PluginContext, PluginDescriptor,
    PluginError, PluginMeta, Selection, SkipReason,
};

#[derive(Default)]
struct Stable;
#[derive(Default)]
struct Trial;
#[derive(Default)]
struct Extra;
#[derive(Default)]
struct SchedDebug;

macro_rules! noop_plugin {
    ($($ty:ty),*) => {$(
        impl Plugin for $ty {
            fn collect(&mut self, _ctx: &mut PluginContext<'_>) -> Result<(), PluginError> {
                Ok(())
            }
        }
    )*};
}
noop_plugin!(Stable, Trial, Extra, SchedDebug);

impl PluginMeta for Stable {}
impl PluginMeta for Trial {
    const EXPERIMENTAL: bool = true;
}
impl PluginMeta for Extra {
    const DEFAULT_ENABLED: bool = false;
}
impl PluginMeta for SchedDebug {}

const NAMES: &[&str] = &["stable", "trial", "extra", "missing"];
const NONE: &[String] = &[];

fn catalog() -> Vec<PluginDescriptor> {
    vec![
        PluginDescriptor::of::<Stable>("stable"),
        PluginDescriptor::of::<Trial>("trial"),
        PluginDescriptor::of::<Extra>("extra"),
    ]
}

fn names() -> impl Strategy<Value = Vec<String>> {
    proptest::sample::subsequence(NAMES, 0..=NAMES.len())
        .prop_map(|v| v.into_iter().map(str::to_string).collect())
}

proptest! {
    #[test]
    fn skip_always_wins(
        only in names(),
        skip in names(),
        enable in names(),
        experimental in any::<bool>(),
    ) {
        let selection = Selection::new(only.as_slice(), NONE, skip.as_slice(), enable.as_slice(), experimental);
        for plugin in catalog() {
            if skip.contains(&plugin.name) {
                prop_assert_ne!(selection.decide(&plugin), Decision::Selected);
            }
        }
    }

    #[test]
    fn experimental_needs_flag_or_name(
        only in names(),
        skip in names(),
        enable in names(),
        experimental in any::<bool>(),
    ) {
        let selection = Selection::new(only.as_slice(), NONE, skip.as_slice(), enable.as_slice(), experimental);
        let trial = PluginDescriptor::of::<Trial>("trial");
        let named = only.iter().chain(&enable).any(|n| n == "trial");
        if selection.decide(&trial) == Decision::Selected {
            prop_assert!(experimental || named);
        }
    }

    #[test]
    fn selection_partitions_discovery(
        only in names(),
        skip in names(),
        enable in names(),
        experimental in any::<bool>(),
    ) {
        let selection = Selection::new(only.as_slice(), NONE, skip.as_slice(), enable.as_slice(), experimental);
        let result = select(catalog(), &selection);
        prop_assert_eq!(result.selected.len() + result.skipped.len(), 3);

        let expect_unknown = only.iter().chain(&skip).chain(&enable).any(|n| n == "missing");
        prop_assert_eq!(result.unknown == vec!["missing".to_string()], expect_unknown);
    }
}

#[test]
fn test_default_selection_runs_builtin_plugins() {
    let selection = Selection::default();
    let result = select(discover(), &selection);
    let selected: Vec<&str> = result.selected.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        selected,
        vec!["kernel_info", "vmcore_commands", "vmcore_procfs", "vmcore_sysfs"]
    );
    assert!(result.skipped.is_empty());
}

#[test]
fn test_retired_plugins_are_not_discovered() {
    let mut all = catalog();
    all.push(PluginDescriptor::of::<SchedDebug>("sched_debug"));
    let discovered = discover_from(all);
    assert!(discovered.iter().all(|p| p.name != "sched_debug"));
    assert_eq!(discovered.len(), 3);
}

#[test]
fn test_only_list_reports_reason_for_the_rest() {
    let selection = Selection::new(&["extra"], &[], &[], &[], false);
    let result = select(catalog(), &selection);
    assert_eq!(result.selected[0].name, "extra");
    let reasons: Vec<SkipReason> = result.skipped.iter().map(|(_, r)| *r).collect();
    assert_eq!(reasons, vec![SkipReason::NotSpecified, SkipReason::NotSpecified]);
}
