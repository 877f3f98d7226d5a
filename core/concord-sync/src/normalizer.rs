//! Cleaning and normalization of configuration trees.
//!
//! Every function here is pure: it reads the input tree and the registry's
//! definitions and builds a new [`FlatSettingMap`]. Local-storage text goes
//! through [`SettingNormalizer::clean_live`]; snapshots and deltas are already
//! typed and go through [`SettingNormalizer::clean`]. Nothing here fails;
//! undecodable values degrade to strings and unknown keys are dropped.

use concord_model::{ConfigRegistry, SettingDefinition, SettingScope, values_equal};
use concord_types::SettingKey;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::config::SyncConfig;
use crate::flat::FlatSettingMap;

/// How leaf values of an input tree are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    /// JSON text as held by local storage.
    Stored,
    /// Values already typed, as in a persisted snapshot or a staged delta.
    Typed,
}

/// Turns raw configuration trees into typed, filtered flat maps.
#[derive(Clone)]
pub struct SettingNormalizer {
    registry: Arc<dyn ConfigRegistry>,
    config: Arc<SyncConfig>,
}

impl SettingNormalizer {
    pub fn new(registry: Arc<dyn ConfigRegistry>, config: Arc<SyncConfig>) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<dyn ConfigRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Flattens an already-typed tree, keeping only configurable settings
    /// whose value differs from the declared default.
    ///
    /// Values are cast to the declared type without parsing string content,
    /// so a String setting holding `"null"` or `"\"dark\""` stays as is.
    /// Structured settings are compared field by field against the default's
    /// fields, and a structured setting whose fields all match is dropped.
    pub fn clean(&self, raw: &Value) -> FlatSettingMap {
        self.walk(raw, Input::Typed, true)
    }

    /// Like [`clean`](Self::clean) for a tree of local-storage JSON text.
    /// Each leaf is parsed before it is cast.
    pub fn clean_live(&self, raw: &Value) -> FlatSettingMap {
        self.walk(raw, Input::Stored, true)
    }

    /// Like [`clean`](Self::clean) but keeps values equal to the default.
    pub fn normalize(&self, raw: &Value) -> FlatSettingMap {
        self.walk(raw, Input::Typed, false)
    }

    /// Re-cleans an existing flat map.
    pub fn clean_map(&self, map: &FlatSettingMap) -> FlatSettingMap {
        self.clean(&map.expand())
    }

    /// Supplies defaults for every synchronized primitive setting, then
    /// writes `map` over them.
    ///
    /// A value reset to its default on one side is then still a real value to
    /// compare against the other side.
    pub fn merge_defaults(&self, map: &FlatSettingMap) -> FlatSettingMap {
        let mut merged: FlatSettingMap = self
            .registry
            .list_declared_settings()
            .iter()
            .filter(|d| self.is_synced(d) && d.is_primitive())
            .map(|d| (d.setting_key(), d.default.clone()))
            .collect();
        merged.overlay(map);
        merged
    }

    /// Local, configurable and outside the excluded namespaces.
    pub fn is_synced(&self, definition: &SettingDefinition) -> bool {
        definition.scope == SettingScope::Local
            && definition.configurable
            && self.config.is_synced_namespace(&definition.namespace)
    }

    fn walk(&self, raw: &Value, input: Input, elide_defaults: bool) -> FlatSettingMap {
        let mut out = FlatSettingMap::new();
        let Some(namespaces) = raw.as_object() else {
            return out;
        };
        for (namespace, settings) in namespaces {
            if !self.config.is_synced_namespace(namespace) {
                continue;
            }
            let Some(settings) = settings.as_object() else {
                debug!("skipping non-object namespace {namespace}");
                continue;
            };
            for (key, value) in settings {
                let Some(definition) = self.registry.definition(namespace, key) else {
                    debug!("skipping undeclared setting {namespace}.{key}");
                    continue;
                };
                if !definition.configurable || definition.scope != SettingScope::Local {
                    continue;
                }
                let setting_key = definition.setting_key();
                let typed = match input {
                    Input::Stored => definition.decode_or_string(value),
                    Input::Typed => definition.coerce_or_string(value),
                };
                if definition.is_primitive() {
                    if !(elide_defaults && values_equal(&typed, &definition.default)) {
                        out.insert(setting_key, typed);
                    }
                } else {
                    clean_structured(
                        &mut out,
                        setting_key,
                        &typed,
                        Some(&definition.default),
                        elide_defaults,
                    );
                }
            }
        }
        out
    }
}

/// Emits the fields of a structured value that differ from `default`.
///
/// Non-empty objects are split into their fields; everything else is a leaf.
/// A field without a counterpart in the default is always kept.
fn clean_structured(
    out: &mut FlatSettingMap,
    key: SettingKey,
    value: &Value,
    default: Option<&Value>,
    elide_defaults: bool,
) {
    match value {
        Value::Object(fields) if !fields.is_empty() => {
            for (segment, field) in fields {
                if segment.is_empty() || segment.contains(concord_types::KEY_SEPARATOR) {
                    continue;
                }
                let field_default = default.and_then(|d| d.get(segment));
                clean_structured(
                    out,
                    key.child(segment.as_str()),
                    field,
                    field_default,
                    elide_defaults,
                );
            }
        }
        leaf => {
            let is_default = default.is_some_and(|d| values_equal(leaf, d));
            if !(elide_defaults && is_default) {
                out.insert(key, leaf.clone());
            }
        }
    }
}
