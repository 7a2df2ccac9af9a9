//! Property tests: every declared or live name ends up in exactly one bucket
//! of the diff, and the bucket matches the declared and live contents.

use std::collections::{BTreeMap, BTreeSet};

use arbor_sync::{ActionSpec, ChangeType, compare};
use kube::core::DynamicObject;
use proptest::prelude::*;
use serde_json::json;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// (value, team label) of one config map
type Contents = (u8, Option<u8>);

fn config_map(name: &str, (value, team): Contents) -> DynamicObject {
    let mut object = DynamicObject::new(name, &ActionSpec::new("", "v1", "ConfigMap", "configmaps", true).api_resource())
        .within("web")
        .data(json!({ "data": { "value": value.to_string() } }));
    if let Some(team) = team {
        object.metadata.labels = Some(BTreeMap::from([("team".to_string(), team.to_string())]));
    }
    object
}

fn same_data(a: &DynamicObject, b: &DynamicObject) -> bool {
    a.data == b.data
}

fn arb_name() -> impl Strategy<Value = String> {
    (0u8..8).prop_map(|i| format!("cm-{}", i))
}

fn arb_contents() -> impl Strategy<Value = Contents> {
    (0u8..3, prop::option::of(0u8..2))
}

/// Declared names are unique
fn arb_declared() -> impl Strategy<Value = BTreeMap<String, Contents>> {
    prop::collection::btree_map(arb_name(), arb_contents(), 0..6)
}

/// Live names may repeat
fn arb_actual() -> impl Strategy<Value = Vec<(String, Contents)>> {
    prop::collection::vec((arb_name(), arb_contents()), 0..8)
}

/// A live object matches when the data is equal and it carries every
/// declared label
fn in_sync(declared: Contents, actual: Contents) -> bool {
    declared.0 == actual.0 && (declared.1.is_none() || declared.1 == actual.1)
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn test_diff_buckets_match_contents(declared in arb_declared(), actual in arb_actual()) {
        let live: BTreeMap<String, Contents> = actual.iter().cloned().collect();

        let diffs = compare(
            same_data,
            declared.iter().map(|(n, c)| config_map(n, *c)).collect(),
            actual.iter().map(|(n, c)| config_map(n, *c)).collect(),
        );

        let mut seen = BTreeSet::new();
        for diff in &diffs {
            prop_assert!(seen.insert(diff.name().to_string()), "'{}' reported twice", diff.name());
        }

        let bucket = |change: ChangeType| -> BTreeSet<String> {
            diffs
                .iter()
                .filter(|d| d.change_type() == change)
                .map(|d| d.name().to_string())
                .collect()
        };

        let adds: BTreeSet<String> = declared.keys().filter(|n| !live.contains_key(*n)).cloned().collect();
        let deletes: BTreeSet<String> = live.keys().filter(|n| !declared.contains_key(*n)).cloned().collect();
        let updates: BTreeSet<String> = declared
            .iter()
            .filter(|(n, c)| live.get(*n).is_some_and(|l| !in_sync(**c, *l)))
            .map(|(n, _)| n.clone())
            .collect();

        prop_assert_eq!(bucket(ChangeType::Add), adds);
        prop_assert_eq!(bucket(ChangeType::Delete), deletes);
        prop_assert_eq!(bucket(ChangeType::Update), updates);

        // Updates and deletes carry the last live copy of a repeated name
        for diff in &diffs {
            if let Some(object) = diff.actual() {
                let expected = config_map(diff.name(), live[diff.name()]);
                prop_assert_eq!(&object.data, &expected.data);
            }
        }
    }

    #[test]
    fn test_converged_state_has_no_diff(declared in arb_declared()) {
        let objects: Vec<_> = declared.iter().map(|(n, c)| config_map(n, *c)).collect();
        let diffs = compare(same_data, objects.clone(), objects);
        prop_assert!(diffs.is_empty());
    }
}
