//! Documents and the field-level write operations applied to them.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// A schemaless document as stored in a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned identifier, unique within the collection
    pub id: String,
    /// Bumped by the store on every successful write
    pub revision: u64,
    /// Top-level fields
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Deserialize the document into a typed model. The document id is
    /// injected as the `id` field.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_string(), Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    /// Read a single top-level field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// A single field-level write. Applied atomically together with the other
/// operations of the same write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum FieldOp {
    /// Replace the field value
    Set { field: String, value: Value },
    /// Remove the field
    Remove { field: String },
    /// Append each value not already present in the array field
    ArrayUnion { field: String, values: Vec<Value> },
    /// Remove every element equal to one of the values
    ArrayRemove { field: String, values: Vec<Value> },
    /// Set the field to the store's commit time
    ServerTimestamp { field: String },
}

/// Write precondition checked atomically against the stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Precondition {
    /// The document must exist
    Exists,
    /// The document must still be at this revision
    Revision(u64),
}

impl Precondition {
    pub fn holds(&self, current: Option<&Document>) -> bool {
        match (self, current) {
            (Precondition::Exists, Some(_)) => true,
            (Precondition::Revision(rev), Some(doc)) => doc.revision == *rev,
            (_, None) => false,
        }
    }
}

/// Builder for the list of operations making up one write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldOps {
    ops: Vec<FieldOp>,
}

impl FieldOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.ops.push(FieldOp::Set {
            field: field.to_string(),
            value: value.into(),
        });
        self
    }

    /// Like [`FieldOps::set`] for any serializable value.
    pub fn set_json<T: Serialize>(self, field: &str, value: &T) -> Result<Self, StoreError> {
        let value = serde_json::to_value(value)?;
        Ok(self.set(field, value))
    }

    pub fn remove(mut self, field: &str) -> Self {
        self.ops.push(FieldOp::Remove {
            field: field.to_string(),
        });
        self
    }

    pub fn array_union(mut self, field: &str, values: Vec<Value>) -> Self {
        self.ops.push(FieldOp::ArrayUnion {
            field: field.to_string(),
            values,
        });
        self
    }

    pub fn array_remove(mut self, field: &str, values: Vec<Value>) -> Self {
        self.ops.push(FieldOp::ArrayRemove {
            field: field.to_string(),
            values,
        });
        self
    }

    pub fn server_timestamp(mut self, field: &str) -> Self {
        self.ops.push(FieldOp::ServerTimestamp {
            field: field.to_string(),
        });
        self
    }

    pub fn ops(&self) -> &[FieldOp] {
        &self.ops
    }

    /// Apply the operations in order. `now` is the commit time used for
    /// server timestamps.
    pub fn apply(&self, fields: &mut Map<String, Value>, now: DateTime<Utc>) {
        for op in &self.ops {
            match op {
                FieldOp::Set { field, value } => {
                    fields.insert(field.clone(), value.clone());
                }
                FieldOp::Remove { field } => {
                    fields.remove(field);
                }
                FieldOp::ArrayUnion { field, values } => {
                    let entry = fields
                        .entry(field.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if !entry.is_array() {
                        *entry = Value::Array(Vec::new());
                    }
                    if let Value::Array(items) = entry {
                        for value in values {
                            if !items.contains(value) {
                                items.push(value.clone());
                            }
                        }
                    }
                }
                FieldOp::ArrayRemove { field, values } => {
                    if let Some(Value::Array(items)) = fields.get_mut(field) {
                        items.retain(|item| !values.contains(item));
                    }
                }
                FieldOp::ServerTimestamp { field } => {
                    fields.insert(
                        field.clone(),
                        serde_json::to_value(now).unwrap_or(Value::Null),
                    );
                }
            }
        }
    }
}
