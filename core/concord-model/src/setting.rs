use concord_types::SettingKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The declared type of a setting.
///
/// Each variant knows how to decode a stored value into its own shape and how
/// to encode a typed value for local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingType {
    Boolean,
    Number,
    String,
    /// Object- or array-valued setting whose fields are synchronized individually.
    Structured,
}

/// A stored value could not be cast to the declared type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot coerce {value} to {expected:?}")]
pub struct CoercionError {
    pub expected: SettingType,
    pub value: Value,
}

impl SettingType {
    /// Boolean, Number and String are primitive; Structured is not.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, SettingType::Structured)
    }

    /// Decodes a stored value into this type.
    ///
    /// Strings are first parsed as JSON (local storage holds JSON text); text
    /// that is not valid JSON is kept as a plain string. The parsed value is
    /// then cast with [`SettingType::coerce`].
    pub fn decode(&self, raw: &Value) -> Result<Value, CoercionError> {
        let parsed = match raw {
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::String(inner)) => Value::String(inner),
                // String settings keep their text unless it is a JSON string literal.
                Ok(_) if *self == SettingType::String => Value::String(text.clone()),
                Ok(value) => value,
                Err(_) => Value::String(text.clone()),
            },
            other => other.clone(),
        };
        self.coerce(parsed)
    }

    /// Casts an already-parsed value to this type.
    pub fn coerce(&self, value: Value) -> Result<Value, CoercionError> {
        let fail = |value: Value| CoercionError {
            expected: *self,
            value,
        };
        match (self, value) {
            (SettingType::Boolean, v @ Value::Bool(_)) => Ok(v),
            (SettingType::Number, v @ Value::Number(_)) => Ok(v),
            (SettingType::Number, Value::String(s)) => match parse_number(&s) {
                Some(number) => Ok(number),
                None => Err(fail(Value::String(s))),
            },
            (SettingType::String, v @ Value::String(_)) => Ok(v),
            (SettingType::String, v @ (Value::Number(_) | Value::Bool(_))) => {
                Ok(Value::String(v.to_string()))
            }
            (SettingType::String, v @ (Value::Object(_) | Value::Array(_))) => {
                Ok(Value::String(v.to_string()))
            }
            (SettingType::Structured, v @ (Value::Object(_) | Value::Array(_))) => Ok(v),
            (_, other) => Err(fail(other)),
        }
    }

    /// Encodes a typed value as the JSON text stored in local storage.
    pub fn encode(&self, value: &Value) -> String {
        value.to_string()
    }
}

fn parse_number(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::from(int));
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

/// Where a setting's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingScope {
    /// Stored per participant in local storage; these are the synchronized ones.
    Local,
    /// Stored once for everyone by the host.
    Shared,
}

/// A declared setting, owned by the registry and immutable for the process
/// lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDefinition {
    pub namespace: String,
    pub key: String,
    /// Human-readable label for presentation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub setting_type: SettingType,
    pub default: Value,
    pub scope: SettingScope,
    /// Whether the setting is exposed for editing at all.
    pub configurable: bool,
    /// Only participants allowed to modify restricted settings may change it.
    #[serde(default)]
    pub restricted: bool,
    /// Applying a new value requires the host to reload.
    #[serde(default)]
    pub on_change_side_effect: bool,
}

impl SettingDefinition {
    fn simple(namespace: &str, key: &str, setting_type: SettingType, default: Value) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
            name: None,
            setting_type,
            default,
            scope: SettingScope::Local,
            configurable: true,
            restricted: false,
            on_change_side_effect: false,
        }
    }

    /// Shorthand for a local, configurable Boolean setting.
    pub fn boolean(namespace: &str, key: &str, default: bool) -> Self {
        Self::simple(namespace, key, SettingType::Boolean, Value::Bool(default))
    }

    /// Shorthand for a local, configurable Number setting.
    pub fn number(namespace: &str, key: &str, default: impl Into<serde_json::Number>) -> Self {
        Self::simple(namespace, key, SettingType::Number, Value::Number(default.into()))
    }

    /// Shorthand for a local, configurable String setting.
    pub fn string(namespace: &str, key: &str, default: &str) -> Self {
        Self::simple(namespace, key, SettingType::String, Value::String(default.into()))
    }

    /// Shorthand for a local, configurable Structured setting.
    pub fn structured(namespace: &str, key: &str, default: Value) -> Self {
        Self::simple(namespace, key, SettingType::Structured, default)
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn shared(mut self) -> Self {
        self.scope = SettingScope::Shared;
        self
    }

    /// Marks the setting as not exposed for configuration.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.configurable = false;
        self
    }

    #[must_use]
    pub fn restricted(mut self) -> Self {
        self.restricted = true;
        self
    }

    #[must_use]
    pub fn requires_reload(mut self) -> Self {
        self.on_change_side_effect = true;
        self
    }

    /// The fully qualified key of this setting.
    pub fn setting_key(&self) -> SettingKey {
        SettingKey::new(self.namespace.clone(), self.key.clone())
    }

    /// Display label: the declared name, or the key itself.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.key)
    }

    pub fn is_primitive(&self) -> bool {
        self.setting_type.is_primitive()
    }

    /// Decodes a stored value, falling back to its string form when it
    /// cannot be cast to the declared type.
    pub fn decode_or_string(&self, raw: &Value) -> Value {
        let decoded = self.setting_type.decode(raw);
        self.or_string(decoded)
    }

    /// Casts an already-typed value without parsing string content, falling
    /// back to its string form like [`decode_or_string`](Self::decode_or_string).
    pub fn coerce_or_string(&self, value: &Value) -> Value {
        let coerced = self.setting_type.coerce(value.clone());
        self.or_string(coerced)
    }

    fn or_string(&self, result: Result<Value, CoercionError>) -> Value {
        result.unwrap_or_else(|err| {
            tracing::debug!(
                "coercion failed for {}.{}: {err}; keeping string form",
                self.namespace,
                self.key
            );
            Value::String(crate::value_to_string(&err.value))
        })
    }
}
