use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// Errors that can occur while building a Record
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("model serialization failed: {0}")]
    Serialize(String),
}

/// A dynamic record representing one database row as a column -> value map.
///
/// Keys are kept sorted so any SQL generated from a record lists columns in a
/// deterministic order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Create a new empty record
    pub fn new() -> Self {
        Self { fields: BTreeMap::new() }
    }

    /// Create a record from a JSON object
    pub fn from_value(json: Value) -> Result<Self, RecordError> {
        match json {
            Value::Object(map) => Ok(Self { fields: map.into_iter().collect() }),
            other => Err(RecordError::NotAnObject(json_type_name(&other))),
        }
    }

    /// Create a record by serializing a model struct (mix-in bundles flatten
    /// into their column names)
    pub fn from_model<T: Serialize>(model: &T) -> Result<Self, RecordError> {
        let json = serde_json::to_value(model).map_err(|e| RecordError::Serialize(e.to_string()))?;
        Self::from_value(json)
    }

    /// Create a record from a fetched SQL row
    pub fn from_row(row: Map<String, Value>) -> Self {
        Self { fields: row.into_iter().collect() }
    }

    /// Get field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set field value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set field only if it's currently absent or null
    pub fn set_if_empty(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        match self.fields.get(&key) {
            None | Some(Value::Null) => {
                self.fields.insert(key, value.into());
            }
            Some(_) => {}
        }
        self
    }

    /// Remove field and return its value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Column names in sorted order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    /// Iterate fields in column order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Convert to a JSON object value
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self::from_row(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.to_value()
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
