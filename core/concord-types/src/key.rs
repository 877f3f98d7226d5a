//! Namespaced setting keys.
//!
//! A key is a namespace plus a non-empty path. The first path segment names
//! the declared setting; further segments address fields inside a structured
//! setting. The dotted form (`"mod-a.volume"`, `"mod-a.layout.width"`) is the
//! one used by flat setting maps.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Separator between namespace and path segments in the dotted form.
pub const KEY_SEPARATOR: char = '.';

/// A fully qualified, dotted setting key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SettingKey {
    namespace: String,
    path: Vec<String>,
}

impl SettingKey {
    /// Creates a key for a declared setting (`namespace.key`).
    #[must_use]
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            path: vec![key.into()],
        }
    }

    /// Builds a key from a namespace and a segment path.
    ///
    /// Fails if the path is empty or any segment is empty or contains the
    /// separator.
    pub fn from_segments<I, S>(namespace: impl Into<String>, path: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let namespace = namespace.into();
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        validate_segment(&namespace)?;
        if path.is_empty() {
            return Err(Error::InvalidKey(format!("{namespace}: empty key path")));
        }
        for segment in &path {
            validate_segment(segment)?;
        }
        Ok(Self { namespace, path })
    }

    /// Parses the dotted form. At least two segments are required.
    pub fn parse(dotted: &str) -> Result<Self, Error> {
        let mut segments = dotted.split(KEY_SEPARATOR);
        let namespace = segments.next().unwrap_or_default();
        Self::from_segments(namespace, segments)
            .map_err(|_| Error::InvalidKey(dotted.to_string()))
    }

    /// The owning namespace (module, system, or `core`).
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The declared setting name (first path segment).
    pub fn key(&self) -> &str {
        &self.path[0]
    }

    /// All path segments after the namespace.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Whether this key addresses a field inside a structured setting.
    pub fn is_nested(&self) -> bool {
        self.path.len() > 1
    }

    /// The key of the declared setting that owns this key.
    #[must_use]
    pub fn setting(&self) -> SettingKey {
        SettingKey::new(self.namespace.clone(), self.path[0].clone())
    }

    /// Returns a key one level deeper.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> SettingKey {
        let mut path = self.path.clone();
        path.push(segment.into());
        SettingKey {
            namespace: self.namespace.clone(),
            path,
        }
    }

    /// Iterates namespace first, then each path segment.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.namespace.as_str()).chain(self.path.iter().map(String::as_str))
    }
}

fn validate_segment(segment: &str) -> Result<(), Error> {
    if segment.is_empty() {
        return Err(Error::InvalidKey("empty key segment".to_string()));
    }
    if segment.contains(KEY_SEPARATOR) {
        return Err(Error::InvalidKey(format!(
            "segment {segment:?} contains '{KEY_SEPARATOR}'"
        )));
    }
    Ok(())
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.namespace)?;
        for segment in &self.path {
            write!(f, "{KEY_SEPARATOR}{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for SettingKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SettingKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SettingKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
