//! Schemaless documents as returned by the remote store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map of a document.
pub type Fields = Map<String, Value>;

/// A single document from the remote store.
///
/// Field accessors are lenient: a missing field or a field of the wrong type
/// reads as absent, mirroring how the catalog tooling writes documents with
/// optional fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Build a document from a JSON object literal. Non-object values yield
    /// an empty field map.
    pub fn from_json(id: impl Into<String>, value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            _ => Fields::new(),
        };
        Self::new(id, fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// String field, or `""` when missing.
    pub fn str_or_empty(&self, field: &str) -> String {
        self.get_str(field).unwrap_or_default().to_string()
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(Value::as_f64)
    }

    /// String array field. Non-string elements are skipped.
    pub fn get_str_list(&self, field: &str) -> Vec<String> {
        match self.fields.get(field) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }
}
