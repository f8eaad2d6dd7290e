//! Generic property-group lookups over a parsed TOML document.

use toml::Value;

use crate::ConfigError;

/// A parsed tenant property group.
///
/// Wraps the TOML document and provides dotted-path lookups
/// (`"connection.pool_size"`) with typed accessors. Typed sections are
/// usually extracted wholesale via [`PropertyGroup::section`]; the scalar
/// accessors exist for ad-hoc properties that have no struct.
#[derive(Debug, Clone)]
pub struct PropertyGroup {
    name: String,
    root: Value,
}

impl PropertyGroup {
    /// Parses a property group from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` when the document is not valid TOML.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self, ConfigError> {
        let name = name.into();
        let root = toml::from_str::<Value>(text)
            .map_err(|e| ConfigError::parse(&name, e.to_string()))?;
        Ok(Self { name, root })
    }

    /// The group name, used in error messages (usually the file path).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a value by dotted path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.root;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Looks up a string value by dotted path.
    #[must_use]
    pub fn string_value(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    /// Looks up an integer value by dotted path.
    #[must_use]
    pub fn int_value(&self, path: &str) -> Option<i64> {
        self.get(path).and_then(Value::as_integer)
    }

    /// Looks up a boolean value by dotted path.
    #[must_use]
    pub fn bool_value(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    /// Looks up a required string value by dotted path.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingProperty` when the path is absent or not
    /// a string.
    pub fn required_string(&self, path: &str) -> Result<&str, ConfigError> {
        self.string_value(path)
            .ok_or_else(|| ConfigError::missing_property(format!("{}:{path}", self.name)))
    }

    /// Deserializes the whole group into a typed configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` when the document does not match the
    /// target shape.
    pub fn as_typed<T: serde::de::DeserializeOwned>(&self) -> Result<T, ConfigError> {
        self.root
            .clone()
            .try_into()
            .map_err(|e| ConfigError::parse(&self.name, e.to_string()))
    }
}
