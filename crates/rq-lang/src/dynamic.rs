//! Transport-safe, type-erased result values.
pub mod mapper;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use smol_str::SmolStr;
use thiserror::Error;

use crate::{source::SourceError, types::TypeDescriptor};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("Reference cycle through an object of type {0}")]
    Cycle(TypeDescriptor),
    #[error("Result nesting exceeds the maximum depth of {0}")]
    DepthExceeded(u32),
    #[error("A {0} cannot be represented as a dynamic value")]
    Unmappable(&'static str),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("Failed to decode dynamic value: {0}")]
    Decode(String),
}

/// Leaf, ordered list, or named-field mapping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DynamicValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<DynamicValue>),
    Object(DynamicObject),
}

/// Named fields in declaration order, optionally tagged with the type they
/// were mapped from.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DynamicObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeDescriptor>,
    pub properties: Vec<(SmolStr, DynamicValue)>,
}

impl DynamicObject {
    pub fn new(ty: Option<TypeDescriptor>) -> Self {
        Self {
            ty,
            properties: Vec::new(),
        }
    }

    pub fn with(mut self, name: &str, value: DynamicValue) -> Self {
        self.properties.push((SmolStr::new(name), value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&DynamicValue> {
        self.properties.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

impl DynamicValue {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, DynamicValue::Null)
    }

    /// Field of an object value.
    pub fn get(&self, name: &str) -> Option<&DynamicValue> {
        match self {
            DynamicValue::Object(o) => o.get(name),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[DynamicValue]> {
        match self {
            DynamicValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Plain JSON view. Type tags on objects are dropped.
    pub fn to_json_value(&self) -> serde_json::Value {
        match self {
            DynamicValue::Null => serde_json::Value::Null,
            DynamicValue::Bool(b) => serde_json::Value::Bool(*b),
            DynamicValue::Int(n) => serde_json::Value::from(*n),
            DynamicValue::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            DynamicValue::String(s) => serde_json::Value::String(s.clone()),
            DynamicValue::List(items) => serde_json::Value::Array(items.iter().map(|v| v.to_json_value()).collect()),
            DynamicValue::Object(o) => serde_json::Value::Object(
                o.properties
                    .iter()
                    .map(|(name, v)| (name.to_string(), v.to_json_value()))
                    .collect(),
            ),
        }
    }

    /// Decodes into a concrete type by field name. Fields absent from the
    /// value fall back to the type's serde defaults.
    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T, MappingError> {
        serde_json::from_value(self.to_json_value()).map_err(|e| MappingError::Decode(e.to_string()))
    }
}

impl From<bool> for DynamicValue {
    fn from(b: bool) -> Self {
        DynamicValue::Bool(b)
    }
}

impl From<i64> for DynamicValue {
    fn from(n: i64) -> Self {
        DynamicValue::Int(n)
    }
}

impl From<f64> for DynamicValue {
    fn from(n: f64) -> Self {
        DynamicValue::Float(n)
    }
}

impl From<&str> for DynamicValue {
    fn from(s: &str) -> Self {
        DynamicValue::String(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Default, PartialEq, Deserialize)]
    #[serde(default)]
    struct Summary {
        name: String,
        count: i64,
        note: Option<String>,
    }

    #[test]
    fn test_to_typed_matches_fields_by_name() {
        let value = DynamicValue::Object(
            DynamicObject::new(None)
                .with("name", "a".into())
                .with("count", DynamicValue::Int(3))
                .with("Extra", DynamicValue::Bool(true)),
        );
        assert_eq!(
            value.to_typed::<Summary>().unwrap(),
            Summary {
                name: "a".to_string(),
                count: 3,
                note: None,
            }
        );
    }

    #[test]
    fn test_field_names_are_case_sensitive() {
        let value = DynamicValue::Object(DynamicObject::new(None).with("Name", "a".into()));
        assert_eq!(value.to_typed::<Summary>().unwrap(), Summary::default());
    }

    #[test]
    fn test_serde_round_trip() {
        let value = DynamicValue::List(vec![
            DynamicValue::Null,
            DynamicValue::Object(DynamicObject::new(Some(TypeDescriptor::new("app", "P"))).with("x", DynamicValue::Float(1.5))),
        ]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(serde_json::from_str::<DynamicValue>(&json).unwrap(), value);
    }
}
