//! Reconciliation configuration.
//!
//! Built once at startup (defaults, or a TOML file) and shared read-only as
//! `Arc<SyncConfig>` by every component.

use concord_model::{ConfigRegistry, SettingDefinition};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{SyncError, SyncResult};

/// How chatty the reconciliation layer is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Applied changes and lifecycle events.
    #[default]
    Normal,
    /// Every decision, including skipped keys and recovered decode failures.
    Debug,
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub verbosity: Verbosity,
    /// Full `EnvFilter` directive; overrides `verbosity` when set.
    pub filter: Option<String>,
}

impl LogConfig {
    /// The filter directive to install.
    pub fn directive(&self) -> String {
        if let Some(filter) = &self.filter {
            return filter.clone();
        }
        match self.verbosity {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "info",
            Verbosity::Debug => "debug",
        }
        .to_string()
    }
}

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Namespace owning the attached records and the opt-in setting. Settings
    /// in this namespace are never synchronized.
    pub namespace: String,
    /// Further namespaces that are never synchronized.
    pub excluded_namespaces: Vec<String>,
    /// Key of the Boolean opt-in setting inside `namespace`.
    pub sync_enabled_key: String,
    /// Namespace of built-in settings.
    pub core_namespace: String,
    /// Display title for the built-in namespace.
    pub core_title: String,
    pub log: LogConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            namespace: "concord".to_string(),
            excluded_namespaces: Vec::new(),
            sync_enabled_key: "sync-settings".to_string(),
            core_namespace: "core".to_string(),
            core_title: "Core Settings".to_string(),
            log: LogConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Parses a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> SyncResult<Self> {
        let config: SyncConfig =
            toml::from_str(text).map_err(|e| SyncError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> SyncResult<()> {
        if self.namespace.is_empty() {
            return Err(SyncError::Config("namespace must not be empty".to_string()));
        }
        if self.sync_enabled_key.is_empty() {
            return Err(SyncError::Config("sync_enabled_key must not be empty".to_string()));
        }
        Ok(())
    }

    /// Whether settings in `namespace` take part in synchronization.
    pub fn is_synced_namespace(&self, namespace: &str) -> bool {
        namespace != self.namespace && !self.excluded_namespaces.iter().any(|n| n == namespace)
    }

    /// Settings this layer declares for itself; hosts register them alongside
    /// their own.
    pub fn own_definitions(&self) -> Vec<SettingDefinition> {
        vec![
            SettingDefinition::boolean(&self.namespace, &self.sync_enabled_key, true)
                .with_name("Sync client settings"),
        ]
    }

    /// Reads the participant's local opt-in. An undeclared setting counts as
    /// enabled.
    pub fn sync_enabled(&self, registry: &dyn ConfigRegistry) -> bool {
        registry
            .live_value(&self.namespace, &self.sync_enabled_key)
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }
}
