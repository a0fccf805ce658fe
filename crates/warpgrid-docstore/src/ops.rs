//! Assertion-guarded document operations.
//!
//! Every write carries a precondition that must still hold when the batch
//! commits. The constructors fix the pairing of assertion and change, so an
//! insert can never fall back to an update (or the other way round); callers
//! that accept several outcomes combine operations explicitly.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};

/// Field holding the document key inside stored documents.
pub const ID_FIELD: &str = "_id";

/// Precondition on the current version of a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Assert {
    DocExists,
    DocMissing,
    /// The document exists and each listed top-level field has the given value.
    Matches(Map<String, Value>),
}

impl Assert {
    /// Evaluate the assertion against the document as currently stored.
    pub fn holds(&self, current: Option<&Value>) -> bool {
        match self {
            Assert::DocExists => current.is_some(),
            Assert::DocMissing => current.is_none(),
            Assert::Matches(expected) => current.is_some_and(|doc| {
                expected
                    .iter()
                    .all(|(field, value)| doc.get(field) == Some(value))
            }),
        }
    }
}

/// What an operation does to its document once the assertion holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Assertion only.
    None,
    Insert(Value),
    /// `$set` semantics: listed fields are overwritten, the rest is kept.
    Update(Map<String, Value>),
    Remove,
}

impl Change {
    /// Produce the next version of the document (`None` = deleted).
    pub fn apply(&self, id: &str, current: Option<Value>) -> Option<Value> {
        match self {
            Change::None => current,
            Change::Insert(doc) => {
                let mut doc = doc.clone();
                if let Value::Object(fields) = &mut doc {
                    fields.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
                }
                Some(doc)
            }
            Change::Update(set) => current.map(|mut doc| {
                if let Value::Object(fields) = &mut doc {
                    for (field, value) in set {
                        if field != ID_FIELD {
                            fields.insert(field.clone(), value.clone());
                        }
                    }
                }
                doc
            }),
            Change::Remove => None,
        }
    }
}

/// A single assertion-guarded operation on one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    collection: String,
    id: String,
    assert: Assert,
    change: Change,
}

impl Op {
    /// Insert `doc`, asserting that no document with `id` exists.
    pub fn insert<T: Serialize>(collection: &str, id: &str, doc: &T) -> StoreResult<Self> {
        let value = serde_json::to_value(doc).map_err(|e| StoreError::Serialize(e.to_string()))?;
        if !value.is_object() {
            return Err(StoreError::Serialize(format!(
                "document {collection}/{id} is not a JSON object"
            )));
        }
        Ok(Self::new(collection, id, Assert::DocMissing, Change::Insert(value)))
    }

    /// Set the given fields, asserting that the document exists.
    pub fn update(collection: &str, id: &str, set: Value) -> StoreResult<Self> {
        let set = object_fields(collection, id, set)?;
        Ok(Self::new(collection, id, Assert::DocExists, Change::Update(set)))
    }

    /// Set the given fields, asserting that the document exists with the
    /// `expected` field values.
    pub fn update_where(
        collection: &str,
        id: &str,
        expected: Value,
        set: Value,
    ) -> StoreResult<Self> {
        let expected = object_fields(collection, id, expected)?;
        let set = object_fields(collection, id, set)?;
        Ok(Self::new(
            collection,
            id,
            Assert::Matches(expected),
            Change::Update(set),
        ))
    }

    /// Delete the document, asserting that it exists.
    pub fn remove(collection: &str, id: &str) -> Self {
        Self::new(collection, id, Assert::DocExists, Change::Remove)
    }

    /// Require the document to exist without changing it.
    pub fn assert_exists(collection: &str, id: &str) -> Self {
        Self::new(collection, id, Assert::DocExists, Change::None)
    }

    fn new(collection: &str, id: &str, assert: Assert, change: Change) -> Self {
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
            assert,
            change,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn assertion(&self) -> &Assert {
        &self.assert
    }

    pub fn change(&self) -> &Change {
        &self.change
    }

    /// The payload of an insert operation.
    pub fn inserted(&self) -> Option<&Value> {
        match &self.change {
            Change::Insert(doc) => Some(doc),
            _ => None,
        }
    }
}

fn object_fields(collection: &str, id: &str, value: Value) -> StoreResult<Map<String, Value>> {
    match value {
        Value::Object(fields) => Ok(fields),
        other => Err(StoreError::Serialize(format!(
            "fields for {collection}/{id} must be a JSON object, got {other}"
        ))),
    }
}
