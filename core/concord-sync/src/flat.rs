//! Flat, dotted-key views of nested configuration trees.

use concord_model::insert_at_path;
use concord_types::SettingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Mapping from dotted setting key to value.
///
/// Keys never overlap: inserting a key removes any entry that is its
/// ancestor or descendant, so the map always expands to a well-formed tree.
/// Serializes as the nested `namespace -> key -> value` tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatSettingMap {
    entries: BTreeMap<SettingKey, Value>,
}

impl FlatSettingMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flattens a nested tree.
    ///
    /// The top level holds namespaces and the level below holds setting keys.
    /// Non-empty objects below that are split into one entry per leaf; arrays,
    /// scalars and empty objects are leaves. Non-object namespaces and
    /// segments that cannot form a key are skipped.
    pub fn flatten(tree: &Value) -> Self {
        let mut map = Self::new();
        let Some(namespaces) = tree.as_object() else {
            return map;
        };
        for (namespace, settings) in namespaces {
            let Some(settings) = settings.as_object() else {
                continue;
            };
            for (key, value) in settings {
                let Ok(root) = SettingKey::from_segments(namespace.as_str(), [key.as_str()]) else {
                    continue;
                };
                map.flatten_into(root, value);
            }
        }
        map
    }

    fn flatten_into(&mut self, key: SettingKey, value: &Value) {
        match value {
            Value::Object(children) if !children.is_empty() => {
                for (segment, child) in children {
                    if segment.is_empty() || segment.contains(concord_types::KEY_SEPARATOR) {
                        continue;
                    }
                    self.flatten_into(key.child(segment.as_str()), child);
                }
            }
            leaf => {
                self.entries.insert(key, leaf.clone());
            }
        }
    }

    /// Rebuilds the nested tree.
    pub fn expand(&self) -> Value {
        let mut tree = Map::new();
        for (key, value) in &self.entries {
            let segments: Vec<&str> = key.segments().collect();
            insert_at_path(&mut tree, &segments, value.clone());
        }
        Value::Object(tree)
    }

    pub fn get(&self, key: &SettingKey) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &SettingKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts a value, replacing overlapping entries.
    pub fn insert(&mut self, key: SettingKey, value: Value) -> Option<Value> {
        self.entries.retain(|existing, _| !overlaps(existing, &key) || *existing == key);
        self.entries.insert(key, value)
    }

    pub fn remove(&mut self, key: &SettingKey) -> Option<Value> {
        self.entries.remove(key)
    }

    /// Removes every entry belonging to the declared setting `key`
    /// (the setting itself and any fields inside it).
    pub fn remove_setting(&mut self, key: &SettingKey) {
        let setting = key.setting();
        self.entries.retain(|existing, _| existing.setting() != setting);
    }

    /// Whether any entry belongs to the declared setting `key`.
    pub fn has_setting(&self, key: &SettingKey) -> bool {
        let setting = key.setting();
        self.entries.keys().any(|existing| existing.setting() == setting)
    }

    pub fn keys(&self) -> impl Iterator<Item = &SettingKey> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SettingKey, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes every entry of `other` over this map.
    pub fn overlay(&mut self, other: &FlatSettingMap) {
        for (key, value) in other.iter() {
            self.insert(key.clone(), value.clone());
        }
    }
}

/// One key is a strict prefix of the other, or they are equal.
fn overlaps(a: &SettingKey, b: &SettingKey) -> bool {
    if a.namespace() != b.namespace() {
        return false;
    }
    let (short, long) = if a.path().len() <= b.path().len() {
        (a.path(), b.path())
    } else {
        (b.path(), a.path())
    };
    long.starts_with(short)
}

impl FromIterator<(SettingKey, Value)> for FlatSettingMap {
    fn from_iter<I: IntoIterator<Item = (SettingKey, Value)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<'a> IntoIterator for &'a FlatSettingMap {
    type Item = (&'a SettingKey, &'a Value);
    type IntoIter = std::collections::btree_map::Iter<'a, SettingKey, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl Serialize for FlatSettingMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.expand().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FlatSettingMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tree = Value::deserialize(deserializer)?;
        Ok(Self::flatten(&tree))
    }
}
