mod common;

use common::{Fixture, registry};
use concord_model::{ConfigRegistry, SettingType};
use concord_sync::{LogConfig, SyncConfig, SyncError, Verbosity, init_tracing};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::io::Write;

#[test]
fn defaults() {
    let config = SyncConfig::default();
    assert_eq!(config.namespace, "concord");
    assert_eq!(config.sync_enabled_key, "sync-settings");
    assert_eq!(config.core_namespace, "core");
    assert_eq!(config.core_title, "Core Settings");
    assert!(config.excluded_namespaces.is_empty());
    assert_eq!(config.log.verbosity, Verbosity::Normal);
}

#[test]
fn partial_toml_keeps_defaults() {
    let config = SyncConfig::from_toml_str(
        r#"
        excluded_namespaces = ["mod-b"]
        core_title = "Grundeinstellungen"

        [log]
        verbosity = "debug"
        "#,
    )
    .unwrap();

    assert_eq!(config.excluded_namespaces, vec!["mod-b".to_string()]);
    assert_eq!(config.core_title, "Grundeinstellungen");
    assert_eq!(config.namespace, "concord");
    assert_eq!(config.log.directive(), "debug");
}

#[test]
fn empty_toml_is_the_default() {
    assert_eq!(SyncConfig::from_toml_str("").unwrap(), SyncConfig::default());
}

#[test]
fn empty_namespace_is_rejected() {
    let err = SyncConfig::from_toml_str(r#"namespace = """#).unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
    let err = SyncConfig::from_toml_str(r#"sync_enabled_key = """#).unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[test]
fn invalid_toml_is_rejected() {
    let err = SyncConfig::from_toml_str("namespace = [").unwrap_err();
    assert!(matches!(err, SyncError::Config(_)));
}

#[test]
fn reads_toml_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, r#"namespace = "my-sync""#).unwrap();
    writeln!(file, r#"sync_enabled_key = "enabled""#).unwrap();

    let config = SyncConfig::from_toml_file(file.path()).unwrap();
    assert_eq!(config.namespace, "my-sync");
    assert_eq!(config.own_definitions()[0].setting_key().to_string(), "my-sync.enabled");
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = SyncConfig::from_toml_file(dir.path().join("absent.toml")).unwrap_err();
    let SyncError::Config(message) = err else {
        panic!("expected a configuration error");
    };
    assert!(message.contains("absent.toml"));
}

#[test]
fn own_and_excluded_namespaces_are_not_synced() {
    let config = SyncConfig {
        excluded_namespaces: vec!["mod-b".to_string()],
        ..SyncConfig::default()
    };
    assert!(!config.is_synced_namespace("concord"));
    assert!(!config.is_synced_namespace("mod-b"));
    assert!(config.is_synced_namespace("mod-a"));
    assert!(config.is_synced_namespace("core"));
}

#[test]
fn own_definition_is_an_enabled_boolean() {
    let definitions = SyncConfig::default().own_definitions();
    assert_eq!(definitions.len(), 1);
    let definition = &definitions[0];
    assert_eq!(definition.setting_type, SettingType::Boolean);
    assert_eq!(definition.default, json!(true));
    assert_eq!(definition.label(), "Sync client settings");
}

#[test]
fn sync_enabled_follows_the_local_setting() {
    let fx = Fixture::new();
    assert!(fx.config.sync_enabled(fx.registry.as_ref()));
    fx.set_live("concord.sync-settings", json!(false));
    assert!(!fx.config.sync_enabled(fx.registry.as_ref()));
    assert!(!fx.engine.sync_enabled());
}

#[test]
fn undeclared_opt_in_counts_as_enabled() {
    let registry = registry();
    let config = SyncConfig {
        namespace: "elsewhere".to_string(),
        ..SyncConfig::default()
    };
    assert!(registry.definition("elsewhere", "sync-settings").is_none());
    assert!(config.sync_enabled(&registry));
}

#[test]
fn filter_overrides_verbosity() {
    let quiet = LogConfig {
        verbosity: Verbosity::Quiet,
        filter: None,
    };
    assert_eq!(quiet.directive(), "error");

    let custom = LogConfig {
        verbosity: Verbosity::Quiet,
        filter: Some("concord_sync=trace".to_string()),
    };
    assert_eq!(custom.directive(), "concord_sync=trace");
}

#[test]
fn tracing_installs_once() {
    let config = LogConfig::default();
    let _ = init_tracing(&config);
    assert!(!init_tracing(&config));
}
