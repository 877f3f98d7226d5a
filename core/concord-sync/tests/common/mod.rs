//! Shared fixtures for reconciliation tests.

#![allow(dead_code)]

use concord_model::{
    ConfigRegistry, MemoryRegistry, NamespaceInfo, NamespaceKind, SettingDefinition,
};
use concord_storage::{IdentityStore, MemoryIdentityStore, Participant, ParticipantRole};
use concord_sync::{
    AdminStaging, ArbitrationDecision, ArbitrationFlow, DifferenceSet, FlatSettingMap,
    ReconciliationEngine, Resolution, SettingNormalizer, SyncConfig,
};
use concord_types::SettingKey;
use serde_json::{Value, json};
use std::sync::Arc;

/// The registry used by most tests.
///
/// | key | type | default | notes |
/// |---|---|---|---|
/// | `core.language` | String | `"en"` | built-in |
/// | `system-x.grid` | Number | `100` | system |
/// | `mod-a.volume` | Number | `50` | |
/// | `mod-a.theme` | String | `"light"` | |
/// | `mod-a.enabled` | Boolean | `false` | |
/// | `mod-a.quality` | Number | `1` | requires reload |
/// | `mod-a.layout` | Structured | `{"width":1,"dock":{"side":"left"}}` | |
/// | `mod-a.secret` | Number | `5` | not configurable |
/// | `mod-a.world` | Number | `0` | shared |
/// | `mod-b.speed` | Number | `10` | |
/// | `mod-b.admin-only` | Boolean | `false` | restricted |
/// | `concord.sync-settings` | Boolean | `true` | own opt-in |
pub fn registry() -> MemoryRegistry {
    let mut registry = MemoryRegistry::new()
        .with_namespace(NamespaceInfo::new("system-x", "System X", NamespaceKind::System))
        .with_namespace(NamespaceInfo::module("mod-a", "Module A"))
        .with_namespace(NamespaceInfo::module("mod-b", "Alpha Module"))
        .with_setting(SettingDefinition::string("core", "language", "en").with_name("Language"))
        .with_setting(SettingDefinition::number("system-x", "grid", 100))
        .with_setting(SettingDefinition::number("mod-a", "volume", 50))
        .with_setting(SettingDefinition::string("mod-a", "theme", "light").with_name("Theme"))
        .with_setting(SettingDefinition::boolean("mod-a", "enabled", false))
        .with_setting(SettingDefinition::number("mod-a", "quality", 1).requires_reload())
        .with_setting(SettingDefinition::structured(
            "mod-a",
            "layout",
            json!({"width": 1, "dock": {"side": "left"}}),
        ))
        .with_setting(SettingDefinition::number("mod-a", "secret", 5).hidden())
        .with_setting(SettingDefinition::number("mod-a", "world", 0).shared())
        .with_setting(SettingDefinition::number("mod-b", "speed", 10))
        .with_setting(SettingDefinition::boolean("mod-b", "admin-only", false).restricted());
    for definition in SyncConfig::default().own_definitions() {
        registry.register(definition);
    }
    registry
}

pub fn key(dotted: &str) -> SettingKey {
    SettingKey::parse(dotted).unwrap()
}

/// Writes a typed local value through the registry.
pub fn set_live(registry: &MemoryRegistry, dotted: &str, value: Value) {
    let key = key(dotted);
    registry
        .set_live_value(key.namespace(), key.key(), &value)
        .unwrap();
}

pub fn live(registry: &MemoryRegistry, dotted: &str) -> Value {
    let key = key(dotted);
    registry.live_value(key.namespace(), key.key()).unwrap()
}

pub fn flat(tree: Value) -> FlatSettingMap {
    FlatSettingMap::flatten(&tree)
}

/// A participant-facing decision resolving every record the same way.
pub fn confirm_all(differences: DifferenceSet, resolution: Resolution) -> ArbitrationDecision {
    let mut flow = ArbitrationFlow::new(differences);
    flow.choose_all(resolution);
    flow.confirm()
}

/// A full engine over in-memory stores with one member and one administrator.
pub struct Fixture {
    pub registry: Arc<MemoryRegistry>,
    pub identity: Arc<MemoryIdentityStore>,
    pub config: Arc<SyncConfig>,
    pub engine: Arc<ReconciliationEngine>,
    pub player: Participant,
    pub admin: Participant,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_registry(registry())
    }

    pub fn with_registry(registry: MemoryRegistry) -> Self {
        Self::with_config(registry, SyncConfig::default())
    }

    pub fn with_config(registry: MemoryRegistry, config: SyncConfig) -> Self {
        let player = Participant::member("Player");
        let admin = Participant::administrator("Game Master");
        let registry = Arc::new(registry);
        let identity = Arc::new(MemoryIdentityStore::with_participants([
            player.clone(),
            admin.clone(),
        ]));
        let config = Arc::new(config);
        let engine = Arc::new(ReconciliationEngine::new(
            registry.clone(),
            identity.clone(),
            config.clone(),
        ));
        Self {
            registry,
            identity,
            config,
            engine,
            player,
            admin,
        }
    }

    pub fn normalizer(&self) -> SettingNormalizer {
        self.engine.normalizer().clone()
    }

    pub fn staging(&self) -> AdminStaging {
        AdminStaging::new(&self.engine)
    }

    /// Adds another participant with the given role.
    pub fn add_participant(&self, name: &str, role: ParticipantRole) -> Participant {
        let participant = Participant::new(name, role);
        self.identity.upsert_participant(&participant).unwrap();
        participant
    }

    pub fn set_live(&self, dotted: &str, value: Value) {
        set_live(&self.registry, dotted, value);
    }

    pub fn live(&self, dotted: &str) -> Value {
        live(&self.registry, dotted)
    }

    /// Reads an attached record of the player under the own namespace.
    pub fn record(&self, field: &str) -> Option<String> {
        self.identity
            .get_attached_record(self.player.id, &self.config.namespace, field)
            .unwrap()
    }

    pub fn set_record(&self, field: &str, value: &str) {
        self.identity
            .set_attached_record(self.player.id, &self.config.namespace, field, value)
            .unwrap();
    }
}
