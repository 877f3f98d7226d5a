//! Property-based tests for normalization and differencing.
//!
//! - Cleaning is idempotent: clean(expand(clean(x))) == clean(x)
//! - Cleaning stored text once yields values that clean to themselves
//! - Flattening and expanding a tree of non-empty objects is lossless
//! - A map never differs from itself
//! - Cleaned output never holds a primitive at its default

mod common;

use common::{Fixture, key};
use concord_model::{ConfigRegistry, values_equal};
use concord_sync::FlatSettingMap;
use proptest::prelude::*;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn segment_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,6}").unwrap()
}

fn leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        (-1000i64..1000).prop_map(Value::from),
        prop::string::string_regex("[a-z ]{0,8}")
            .unwrap()
            .prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
    ]
}

fn object_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(segment_strategy(), leaf_strategy(), 1..4)
        .prop_map(|fields| Value::Object(fields.into_iter().collect()))
}

/// An arbitrary `namespace -> key -> value` tree without empty objects.
fn tree_strategy() -> impl Strategy<Value = Value> {
    let setting = prop_oneof![leaf_strategy(), object_strategy()];
    let settings = prop::collection::btree_map(segment_strategy(), setting, 1..4);
    prop::collection::btree_map(segment_strategy(), settings, 1..4).prop_map(to_tree)
}

/// Theme values, including text that itself parses as JSON.
fn theme_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[ -~]{0,12}").unwrap(),
        Just("\"dark\"".to_string()),
        Just("null".to_string()),
        Just("{}".to_string()),
        Just("42".to_string()),
        Just("true".to_string()),
    ]
}

fn to_tree(namespaces: BTreeMap<String, BTreeMap<String, Value>>) -> Value {
    let tree: Map<String, Value> = namespaces
        .into_iter()
        .map(|(ns, settings)| (ns, Value::Object(settings.into_iter().collect())))
        .collect();
    Value::Object(tree)
}

/// Trees over the fixture registry's declared settings, mixing typed values,
/// stored text and undeclared keys.
fn settings_tree_strategy() -> impl Strategy<Value = Value> {
    (
        prop::option::of(0i64..100),
        prop::option::of(theme_strategy()),
        prop::option::of(any::<bool>()),
        prop::option::of((0i64..5, prop_oneof![Just("left"), Just("right")])),
        prop::option::of(0i64..20),
        prop::option::of(any::<i32>()),
    )
        .prop_map(|(volume, theme, enabled, layout, speed, unknown)| {
            let mut mod_a = Map::new();
            if let Some(volume) = volume {
                mod_a.insert("volume".into(), json!(volume.to_string()));
            }
            if let Some(theme) = theme {
                mod_a.insert("theme".into(), json!(theme));
            }
            if let Some(enabled) = enabled {
                mod_a.insert("enabled".into(), json!(enabled));
            }
            if let Some((width, side)) = layout {
                mod_a.insert(
                    "layout".into(),
                    json!({"width": width, "dock": {"side": side}}),
                );
            }
            if let Some(unknown) = unknown {
                mod_a.insert("unknown".into(), json!(unknown));
            }
            let mut mod_b = Map::new();
            if let Some(speed) = speed {
                mod_b.insert("speed".into(), json!(speed));
            }
            json!({"mod-a": mod_a, "mod-b": mod_b})
        })
}

// =============================================================================
// NORMALIZATION PROPERTIES
// =============================================================================

mod normalization_properties {
    use super::*;

    proptest! {
        /// Cleaning a cleaned tree changes nothing.
        #[test]
        fn clean_is_idempotent(tree in settings_tree_strategy()) {
            let fx = Fixture::new();
            let normalizer = fx.normalizer();

            let once = normalizer.clean(&tree);
            let twice = normalizer.clean(&once.expand());
            prop_assert_eq!(once, twice);
        }

        /// Values cleaned from local storage are stable when cleaned again,
        /// and string settings keep their exact text.
        #[test]
        fn stored_values_clean_idempotently(
            theme in theme_strategy(),
            volume in -1000i64..1000,
        ) {
            let fx = Fixture::new();
            fx.set_live("mod-a.theme", json!(theme.as_str()));
            fx.set_live("mod-a.volume", json!(volume));
            let normalizer = fx.normalizer();

            let once = normalizer.clean_live(&fx.registry.live_config_tree());
            prop_assert_eq!(normalizer.clean(&once.expand()), once.clone());
            if theme != "light" {
                prop_assert_eq!(once.get(&key("mod-a.theme")), Some(&json!(theme.as_str())));
            }
        }

        /// Cleaned output holds no primitive setting at its default.
        #[test]
        fn clean_elides_every_default(tree in settings_tree_strategy()) {
            let fx = Fixture::new();
            let cleaned = fx.normalizer().clean(&tree);

            for (key, value) in cleaned.iter() {
                let definition = fx.registry.definition(key.namespace(), key.key()).unwrap();
                if definition.is_primitive() {
                    prop_assert!(!values_equal(value, &definition.default), "{} kept", key);
                }
            }
        }

        /// Flattening and expanding returns the original tree.
        #[test]
        fn flatten_expand_round_trip(tree in tree_strategy()) {
            let flat = FlatSettingMap::flatten(&tree);
            prop_assert_eq!(flat.expand(), tree);
        }
    }
}

// =============================================================================
// DIFFERENCE PROPERTIES
// =============================================================================

mod difference_properties {
    use super::*;

    proptest! {
        /// A map never differs from itself.
        #[test]
        fn diff_with_itself_is_empty(tree in settings_tree_strategy()) {
            let fx = Fixture::new();
            let normalizer = fx.normalizer();
            let map = normalizer.merge_defaults(&normalizer.clean(&tree));

            prop_assert!(fx.engine.differ().diff(&map, &map).is_empty());
        }

        /// Every key that differs after cleaning shows up exactly once.
        #[test]
        fn diff_against_empty_lists_every_cleaned_key(tree in settings_tree_strategy()) {
            let fx = Fixture::new();
            let cleaned = fx.normalizer().clean(&tree);

            let set = fx.engine.differ().diff(&cleaned, &FlatSettingMap::new());
            prop_assert_eq!(set.len(), cleaned.len());
            for (key, _) in cleaned.iter() {
                prop_assert!(set.record(key).is_some(), "{} missing", key);
            }
        }
    }
}
