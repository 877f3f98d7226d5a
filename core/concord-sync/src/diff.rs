//! Structured differences between two flat setting maps.

use concord_model::{
    ConfigRegistry, NamespaceInfo, NamespaceKind, SettingDefinition, SettingScope, display_value,
    value_at_path, values_equal,
};
use concord_types::SettingKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::arbitration::Resolution;
use crate::config::SyncConfig;
use crate::flat::FlatSettingMap;

/// Where the incoming side of a change came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    /// The participant's own persisted snapshot.
    #[default]
    Snapshot,
    /// A change staged by an administrator.
    Administrator,
}

/// One differing key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingChange {
    pub key: SettingKey,
    /// Display label of the owning setting, with the field path for fields
    /// of a structured setting.
    pub label: String,
    /// The participant's current local value; `None` when it is absent
    /// (at its default).
    pub old_value: Option<Value>,
    /// The incoming value; `None` when the incoming side has no entry.
    pub new_value: Option<Value>,
    pub old_display: String,
    pub new_display: String,
    pub origin: ChangeOrigin,
    pub resolution: Resolution,
    /// Applying the new value requires a reload.
    pub requires_reload: bool,
}

impl fmt::Display for SettingChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: \"{}\" -> \"{}\"",
            self.key, self.old_display, self.new_display
        )
    }
}

/// All changes belonging to one namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeGroup {
    pub namespace: String,
    pub title: String,
    pub kind: NamespaceKind,
    pub changes: Vec<SettingChange>,
}

/// Ordered per-namespace groups of changes.
///
/// Built-in settings come first, then the system, then modules by title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DifferenceSet {
    groups: Vec<ChangeGroup>,
}

impl DifferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(|g| g.changes.is_empty())
    }

    /// Number of change records.
    pub fn len(&self) -> usize {
        self.groups.iter().map(|g| g.changes.len()).sum()
    }

    pub fn groups(&self) -> &[ChangeGroup] {
        &self.groups
    }

    pub fn records(&self) -> impl Iterator<Item = &SettingChange> {
        self.groups.iter().flat_map(|g| g.changes.iter())
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut SettingChange> {
        self.groups.iter_mut().flat_map(|g| g.changes.iter_mut())
    }

    pub fn record(&self, key: &SettingKey) -> Option<&SettingChange> {
        self.records().find(|c| &c.key == key)
    }

    pub fn record_mut(&mut self, key: &SettingKey) -> Option<&mut SettingChange> {
        self.records_mut().find(|c| &c.key == key)
    }

    /// Keeps only the records matching `keep`; emptied groups are removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&SettingChange) -> bool) {
        for group in &mut self.groups {
            group.changes.retain(&mut keep);
        }
        self.groups.retain(|g| !g.changes.is_empty());
    }

    /// Sets the origin of every record whose key matches.
    pub fn mark_origin(&mut self, origin: ChangeOrigin, mut matches: impl FnMut(&SettingKey) -> bool) {
        for change in self.records_mut() {
            if matches(&change.key) {
                change.origin = origin;
            }
        }
    }

    fn push(&mut self, info: NamespaceInfo, change: SettingChange) {
        match self.groups.iter_mut().find(|g| g.namespace == info.id) {
            Some(group) => group.changes.push(change),
            None => self.groups.push(ChangeGroup {
                namespace: info.id,
                title: info.title,
                kind: info.kind,
                changes: vec![change],
            }),
        }
    }

    fn sort(&mut self) {
        self.groups.sort_by(|a, b| {
            kind_rank(a.kind)
                .cmp(&kind_rank(b.kind))
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.namespace.cmp(&b.namespace))
        });
    }
}

fn kind_rank(kind: NamespaceKind) -> u8 {
    match kind {
        NamespaceKind::Core => 0,
        NamespaceKind::System => 1,
        NamespaceKind::Module => 2,
    }
}

impl fmt::Display for DifferenceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for group in &self.groups {
            writeln!(f, "{}", group.title)?;
            for change in &group.changes {
                writeln!(f, "  {change}")?;
            }
        }
        Ok(())
    }
}

/// Computes differences between flat maps.
#[derive(Clone)]
pub struct DifferenceEngine {
    registry: Arc<dyn ConfigRegistry>,
    config: Arc<SyncConfig>,
}

impl DifferenceEngine {
    pub fn new(registry: Arc<dyn ConfigRegistry>, config: Arc<SyncConfig>) -> Self {
        Self { registry, config }
    }

    /// Key-wise difference between the participant's `current` state and an
    /// `incoming` state.
    ///
    /// Keys present on one side only, or with unequal values, produce a
    /// record whose resolution starts as `UseNew`. `UseNew` always writes the
    /// `incoming` side, which restores the snapshot value or accepts a staged
    /// administrator value. Keys without a
    /// configurable client-scoped definition are left out, as are keys in
    /// excluded or uninstalled namespaces.
    pub fn diff(&self, current: &FlatSettingMap, incoming: &FlatSettingMap) -> DifferenceSet {
        let keys: BTreeSet<&SettingKey> = current.keys().chain(incoming.keys()).collect();
        let mut namespaces: BTreeMap<String, Option<NamespaceInfo>> = BTreeMap::new();
        let mut set = DifferenceSet::new();

        for key in keys {
            let old_value = current.get(key);
            let new_value = incoming.get(key);
            if matches!((old_value, new_value), (Some(old), Some(new)) if values_equal(old, new)) {
                continue;
            }

            let Some(definition) = self.registry.definition(key.namespace(), key.key()) else {
                debug!("ignoring difference for undeclared setting {key}");
                continue;
            };
            if !definition.configurable
                || definition.scope != SettingScope::Local
                || !self.config.is_synced_namespace(key.namespace())
            {
                continue;
            }
            let info = namespaces
                .entry(key.namespace().to_string())
                .or_insert_with(|| self.namespace_info(key.namespace()))
                .clone();
            let Some(info) = info else {
                debug!("ignoring difference for {key}: namespace is not installed");
                continue;
            };

            let fallback = default_for(definition, key);
            set.push(
                info,
                SettingChange {
                    key: key.clone(),
                    label: label_for(definition, key),
                    old_display: display_or(old_value, fallback),
                    new_display: display_or(new_value, fallback),
                    old_value: old_value.cloned(),
                    new_value: new_value.cloned(),
                    origin: ChangeOrigin::Snapshot,
                    resolution: Resolution::UseNew,
                    requires_reload: definition.on_change_side_effect,
                },
            );
        }

        set.sort();
        set
    }

    /// Resolves a namespace's display information. The built-in namespace is
    /// always present and carries the configured title.
    fn namespace_info(&self, namespace: &str) -> Option<NamespaceInfo> {
        if namespace == self.config.core_namespace {
            return Some(NamespaceInfo::new(
                namespace,
                self.config.core_title.clone(),
                NamespaceKind::Core,
            ));
        }
        self.registry.namespace(namespace)
    }
}

/// The declared default for `key`, descending into structured defaults.
fn default_for<'a>(definition: &'a SettingDefinition, key: &SettingKey) -> Option<&'a Value> {
    value_at_path(&definition.default, &key.path()[1..])
}

fn label_for(definition: &SettingDefinition, key: &SettingKey) -> String {
    if key.is_nested() {
        format!("{} ({})", definition.label(), key.path()[1..].join("."))
    } else {
        definition.label().to_string()
    }
}

fn display_or(value: Option<&Value>, fallback: Option<&Value>) -> String {
    value.or(fallback).map(display_value).unwrap_or_default()
}
