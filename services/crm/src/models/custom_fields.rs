//! Open-ended custom fields attached to entities
//!
//! Keys are strings and values are any JSON value, checked at the boundary
//! rather than by a compile-time schema.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Deepest nesting accepted inside a single custom field value
pub const MAX_DEPTH: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustomFieldError {
    #[error("custom fields must be a JSON object")]
    NotAnObject,

    #[error("custom field keys must not be empty")]
    EmptyKey,

    #[error("custom field `{key}` nests deeper than {max} levels")]
    TooDeep { key: String, max: usize },

    #[error("custom field value is not representable as JSON: {0}")]
    NotSerializable(String),
}

/// String-keyed map of JSON values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomFields(Map<String, Value>);

impl CustomFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any serializable map-like value.
    ///
    /// Fails when the value serializes to something other than an object or
    /// cannot be serialized at all (e.g. a map with non-string keys).
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, CustomFieldError> {
        let value = serde_json::to_value(value)
            .map_err(|e| CustomFieldError::NotSerializable(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, CustomFieldError> {
        match value {
            Value::Object(map) => {
                let fields = Self(map);
                fields.validate()?;
                Ok(fields)
            }
            Value::Null => Ok(Self::default()),
            _ => Err(CustomFieldError::NotAnObject),
        }
    }

    /// Insert a value, validating it before it lands in the map
    pub fn insert<V: Serialize>(
        &mut self,
        key: impl Into<String>,
        value: V,
    ) -> Result<Option<Value>, CustomFieldError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(CustomFieldError::EmptyKey);
        }
        let value = serde_json::to_value(value)
            .map_err(|e| CustomFieldError::NotSerializable(e.to_string()))?;
        check_depth(&key, &value)?;
        Ok(self.0.insert(key, value))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn validate(&self) -> Result<(), CustomFieldError> {
        for (key, value) in &self.0 {
            if key.trim().is_empty() {
                return Err(CustomFieldError::EmptyKey);
            }
            check_depth(key, value)?;
        }
        Ok(())
    }
}

fn check_depth(key: &str, value: &Value) -> Result<(), CustomFieldError> {
    if depth(value) > MAX_DEPTH {
        return Err(CustomFieldError::TooDeep {
            key: key.to_string(),
            max: MAX_DEPTH,
        });
    }
    Ok(())
}

fn depth(value: &Value) -> usize {
    match value {
        Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
        Value::Object(map) => 1 + map.values().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_accepts_scalars_and_containers() {
        let fields = CustomFields::from_value(json!({
            "industry": "retail",
            "seats": 40,
            "regions": ["emea", "apac"],
            "billing": {"net": 30}
        }))
        .expect("valid fields");
        assert_eq!(fields.len(), 4);
        assert_eq!(fields.get("seats"), Some(&json!(40)));
    }

    #[test]
    fn test_rejects_non_object() {
        assert_eq!(
            CustomFields::from_value(json!(["a"])),
            Err(CustomFieldError::NotAnObject)
        );
    }

    #[test]
    fn test_rejects_non_string_keys() {
        let mut map = HashMap::new();
        map.insert((1, 2), "pair");
        assert!(matches!(
            CustomFields::from_serializable(&map),
            Err(CustomFieldError::NotSerializable(_))
        ));
    }

    #[test]
    fn test_rejects_excessive_nesting() {
        let mut value = json!("leaf");
        for _ in 0..=MAX_DEPTH {
            value = json!([value]);
        }
        let mut fields = CustomFields::new();
        assert!(matches!(
            fields.insert("deep", value),
            Err(CustomFieldError::TooDeep { .. })
        ));
    }

    #[test]
    fn test_rejects_blank_key() {
        let mut fields = CustomFields::new();
        assert_eq!(fields.insert("  ", 1), Err(CustomFieldError::EmptyKey));
    }
}
