//! Documents, field mutations and write staging.
//!
//! Both backends stage a batch of [`Write`]s against their current contents
//! with [`stage_writes`] before touching storage, so a failing write leaves
//! every document in the batch untouched.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// The body of a document.
pub type Fields = Map<String, Value>;

/// Address of one document: `collection/id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocKey {
    pub collection: String,
    pub id: String,
}

impl DocKey {
    pub fn new(collection: impl Into<String>, id: impl ToString) -> Self {
        Self {
            collection: collection.into(),
            id: id.to_string(),
        }
    }
}

impl std::fmt::Display for DocKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: DocKey,
    pub data: Fields,
}

impl Document {
    /// Deserialize the body into a typed record.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
    }
}

/// Serialize a record into a document body.
pub fn encode<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::NotAnObject(other.to_string())),
    }
}

/// A mutation of one top-level field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(String, Value),
    Delete(String),
    /// Append each value not already present. Creates the array if missing.
    ArrayUnion(String, Vec<Value>),
    /// Remove every occurrence of each value. A missing field becomes `[]`.
    ArrayRemove(String, Vec<Value>),
}

impl FieldOp {
    pub fn set(field: &str, value: impl Into<Value>) -> Self {
        Self::Set(field.to_string(), value.into())
    }

    pub fn union(field: &str, value: impl Into<Value>) -> Self {
        Self::ArrayUnion(field.to_string(), vec![value.into()])
    }

    pub fn remove(field: &str, value: impl Into<Value>) -> Self {
        Self::ArrayRemove(field.to_string(), vec![value.into()])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Create or overwrite.
    Set(DocKey, Fields),
    /// Mutate an existing document; fails with `NotFound` if absent.
    Update(DocKey, Vec<FieldOp>),
    /// Mutate, creating an empty document first if absent.
    Upsert(DocKey, Vec<FieldOp>),
    Delete(DocKey),
}

impl Write {
    pub fn key(&self) -> &DocKey {
        match self {
            Write::Set(k, _) | Write::Update(k, _) | Write::Upsert(k, _) | Write::Delete(k) => k,
        }
    }
}

/// Net effect of a batch on one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Staged {
    pub key: DocKey,
    pub before: Option<Fields>,
    pub after: Option<Fields>,
}

pub fn apply_ops(key: &DocKey, data: &mut Fields, ops: &[FieldOp]) -> Result<()> {
    for op in ops {
        match op {
            FieldOp::Set(field, value) => {
                data.insert(field.clone(), value.clone());
            }
            FieldOp::Delete(field) => {
                data.remove(field);
            }
            FieldOp::ArrayUnion(field, values) => {
                let entry = data
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                let arr = entry.as_array_mut().ok_or_else(|| StoreError::NotAnArray {
                    key: key.clone(),
                    field: field.clone(),
                })?;
                for v in values {
                    if !arr.contains(v) {
                        arr.push(v.clone());
                    }
                }
            }
            FieldOp::ArrayRemove(field, values) => {
                let entry = data
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                let arr = entry.as_array_mut().ok_or_else(|| StoreError::NotAnArray {
                    key: key.clone(),
                    field: field.clone(),
                })?;
                arr.retain(|v| !values.contains(v));
            }
        }
    }
    Ok(())
}

/// Compute the net effect of `writes` on top of the documents returned by
/// `lookup`. Later writes to the same key see earlier ones.
pub fn stage_writes<F>(mut lookup: F, writes: Vec<Write>) -> Result<Vec<Staged>>
where
    F: FnMut(&DocKey) -> Result<Option<Fields>>,
{
    let mut staged: Vec<Staged> = Vec::new();

    for write in writes {
        let idx = match staged.iter().position(|s| &s.key == write.key()) {
            Some(idx) => idx,
            None => {
                let before = lookup(write.key())?;
                staged.push(Staged {
                    key: write.key().clone(),
                    after: before.clone(),
                    before,
                });
                staged.len() - 1
            }
        };
        let slot = &mut staged[idx];

        match write {
            Write::Set(_, data) => slot.after = Some(data),
            Write::Delete(_) => slot.after = None,
            Write::Update(key, ops) => {
                let data = slot
                    .after
                    .as_mut()
                    .ok_or_else(|| StoreError::NotFound(key.clone()))?;
                apply_ops(&key, data, &ops)?;
            }
            Write::Upsert(key, ops) => {
                let data = slot.after.get_or_insert_with(Fields::new);
                apply_ops(&key, data, &ops)?;
            }
        }
    }

    Ok(staged)
}
