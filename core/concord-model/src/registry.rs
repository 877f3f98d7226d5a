//! The host's configuration registry and an in-process implementation.

use crate::{SettingDefinition, insert_at_path};
use concord_types::SettingKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Result type for registry writes.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised by a registry when writing live values.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("setting is not registered: {0}")]
    UnknownSetting(String),

    #[error("local storage error: {0}")]
    Storage(String),
}

/// What kind of owner a namespace has. Built-in settings get a fixed title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamespaceKind {
    Core,
    System,
    Module,
}

/// A namespace that currently exists in the host (an installed module, the
/// active system, or the core).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceInfo {
    pub id: String,
    pub title: String,
    pub kind: NamespaceKind,
}

impl NamespaceInfo {
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: NamespaceKind) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
        }
    }

    pub fn module(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(id, title, NamespaceKind::Module)
    }
}

/// Source of truth for declared settings and the participant's local values.
///
/// The reconciliation core only reads definitions and writes local values
/// through this trait; it never touches host state any other way.
pub trait ConfigRegistry: Send + Sync {
    /// All declared settings, in a stable order.
    fn list_declared_settings(&self) -> &[SettingDefinition];

    /// Looks up a single definition.
    fn definition(&self, namespace: &str, key: &str) -> Option<&SettingDefinition> {
        self.list_declared_settings()
            .iter()
            .find(|d| d.namespace == namespace && d.key == key)
    }

    /// Returns the namespace if it is still present in the host.
    fn namespace(&self, id: &str) -> Option<NamespaceInfo>;

    /// The current typed local value, or the default when nothing is stored.
    /// `None` if the setting is not declared.
    fn live_value(&self, namespace: &str, key: &str) -> Option<Value>;

    /// Writes a typed value to local storage.
    fn set_live_value(&self, namespace: &str, key: &str, value: &Value) -> RegistryResult<()>;

    /// Removes a stored local value so the default applies again.
    fn clear_live_value(&self, namespace: &str, key: &str) -> RegistryResult<()>;

    /// All stored local values as a nested `namespace -> key -> raw` tree.
    fn live_config_tree(&self) -> Value;
}

/// In-process registry whose local storage is a flat `namespace.key -> JSON text`
/// map, like a browser's local storage.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    definitions: Vec<SettingDefinition>,
    index: BTreeMap<(String, String), usize>,
    namespaces: BTreeMap<String, NamespaceInfo>,
    storage: Mutex<BTreeMap<String, String>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a namespace as present.
    #[must_use]
    pub fn with_namespace(mut self, info: NamespaceInfo) -> Self {
        self.namespaces.insert(info.id.clone(), info);
        self
    }

    /// Declares a setting. Re-registering a key replaces the earlier definition.
    #[must_use]
    pub fn with_setting(mut self, definition: SettingDefinition) -> Self {
        self.register(definition);
        self
    }

    pub fn register(&mut self, definition: SettingDefinition) {
        let id = (definition.namespace.clone(), definition.key.clone());
        match self.index.get(&id) {
            Some(&slot) => self.definitions[slot] = definition,
            None => {
                self.index.insert(id, self.definitions.len());
                self.definitions.push(definition);
            }
        }
    }

    /// Removes a namespace, as if its module had been uninstalled. Its
    /// definitions stay declared.
    pub fn remove_namespace(&mut self, id: &str) {
        self.namespaces.remove(id);
    }

    /// Stores raw text under a dotted key without any encoding.
    pub fn set_raw(&self, dotted: &str, raw: impl Into<String>) {
        self.lock_storage().insert(dotted.to_string(), raw.into());
    }

    /// Returns the raw stored text for a dotted key.
    pub fn raw(&self, dotted: &str) -> Option<String> {
        self.lock_storage().get(dotted).cloned()
    }

    fn lock_storage(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        // A poisoned lock still holds consistent string data.
        self.storage.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ConfigRegistry for MemoryRegistry {
    fn list_declared_settings(&self) -> &[SettingDefinition] {
        &self.definitions
    }

    fn definition(&self, namespace: &str, key: &str) -> Option<&SettingDefinition> {
        self.index
            .get(&(namespace.to_string(), key.to_string()))
            .map(|&slot| &self.definitions[slot])
    }

    fn namespace(&self, id: &str) -> Option<NamespaceInfo> {
        self.namespaces.get(id).cloned()
    }

    fn live_value(&self, namespace: &str, key: &str) -> Option<Value> {
        let definition = self.definition(namespace, key)?;
        let dotted = SettingKey::new(namespace, key).to_string();
        match self.raw(&dotted) {
            Some(raw) => Some(definition.decode_or_string(&Value::String(raw))),
            None => Some(definition.default.clone()),
        }
    }

    fn set_live_value(&self, namespace: &str, key: &str, value: &Value) -> RegistryResult<()> {
        let definition = self
            .definition(namespace, key)
            .ok_or_else(|| RegistryError::UnknownSetting(format!("{namespace}.{key}")))?;
        let encoded = definition.setting_type.encode(value);
        self.set_raw(&SettingKey::new(namespace, key).to_string(), encoded);
        Ok(())
    }

    fn clear_live_value(&self, namespace: &str, key: &str) -> RegistryResult<()> {
        self.lock_storage()
            .remove(&SettingKey::new(namespace, key).to_string());
        Ok(())
    }

    fn live_config_tree(&self) -> Value {
        let storage = self.lock_storage();
        let mut tree = Map::new();
        for (dotted, raw) in storage.iter() {
            let Ok(key) = SettingKey::parse(dotted) else {
                continue;
            };
            let segments: Vec<&str> = key.segments().collect();
            insert_at_path(&mut tree, &segments, Value::String(raw.clone()));
        }
        Value::Object(tree)
    }
}
