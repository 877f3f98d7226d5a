//! Setting model for Concord.
//!
//! Defines the types every reconciliation component depends on:
//! - [`SettingDefinition`]: one declared setting (type, default, scope, flags)
//! - [`SettingType`]: closed set of value types, each with its own decode/encode
//! - [`ConfigRegistry`]: the host's source of declared settings and live values
//! - [`MemoryRegistry`]: an in-process registry backed by a flat key/value store
//!
//! Values are carried as `serde_json::Value` and compared with
//! [`values_equal`], which treats `50` and `50.0` as the same number.

mod registry;
mod setting;
mod value;

pub use registry::{
    ConfigRegistry, MemoryRegistry, NamespaceInfo, NamespaceKind, RegistryError, RegistryResult,
};
pub use setting::{CoercionError, SettingDefinition, SettingScope, SettingType};
pub use value::{
    display_value, insert_at_path, remove_at_path, value_at_path, value_to_string, values_equal,
};
