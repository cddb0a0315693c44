/*
    record.rs - Opaque JSON records

    A record is a JSON object whose content the sync engine never inspects
    beyond two fields: the identity field and the order-key field named by
    its collection.
*/

use super::collection::CollectionSpec;
use super::types::Identity;
use crate::core_store::store::errors::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One JSON object belonging to a collection
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Record(Map::new())
    }

    /// Wrap a JSON value, which must be an object
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        match value {
            Value::Object(map) => Ok(Record(map)),
            other => Err(ValidationError::InvalidField {
                field: "record".to_string(),
                reason: format!("expected a JSON object, got {}", json_kind(&other)),
            }),
        }
    }

    /// Builder-style field setter
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Identity under the given field.
    ///
    /// Strings are used as-is and numbers by their decimal rendering. Any
    /// other value, or a missing field, yields no identity.
    pub fn identity(&self, field: &str) -> Option<Identity> {
        Identity::from_json(self.0.get(field)?)
    }

    /// Sort key under the given field; missing or non-scalar values sort first.
    pub fn order_key(&self, field: &str) -> String {
        match self.0.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    /// Check that the record can enter `spec` and return its identity.
    pub fn validate_for(&self, spec: &CollectionSpec) -> Result<Identity, ValidationError> {
        match self.0.get(spec.identity_field) {
            None | Some(Value::Null) => {
                Err(ValidationError::MissingField(spec.identity_field.to_string()))
            }
            Some(value) => self.identity(spec.identity_field).ok_or_else(|| {
                ValidationError::InvalidField {
                    field: spec.identity_field.to_string(),
                    reason: format!("expected string or number, got {}", json_kind(value)),
                }
            }),
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Record(map)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
