//! Filters for multi-document lookups.

use std::cmp::Ordering;

use serde_json::Value;

use crate::ops::ID_FIELD;

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Eq(String, Value),
    AnyOf(String, Vec<Value>),
    Ids(Vec<String>),
}

/// A conjunction of field clauses with an optional ascending sort.
///
/// An empty query matches every document of a collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    clauses: Vec<Clause>,
    sort_by: Option<String>,
}

impl Query {
    pub fn all() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.clauses.push(Clause::Eq(field.to_string(), value.into()));
        self
    }

    /// Require the field value to be one of `values`.
    pub fn any_of<V: Into<Value>>(mut self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.clauses.push(Clause::AnyOf(field.to_string(), values));
        self
    }

    /// Restrict to documents whose key is one of `ids`.
    pub fn ids<S: AsRef<str>>(mut self, ids: &[S]) -> Self {
        let ids = ids.iter().map(|id| id.as_ref().to_string()).collect();
        self.clauses.push(Clause::Ids(ids));
        self
    }

    pub fn sort_by(mut self, field: &str) -> Self {
        self.sort_by = Some(field.to_string());
        self
    }

    /// Whether the document stored under `id` satisfies every clause.
    pub fn matches(&self, id: &str, doc: &Value) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Eq(field, value) => doc.get(field) == Some(value),
            Clause::AnyOf(field, values) => doc.get(field).is_some_and(|v| values.contains(v)),
            Clause::Ids(ids) => ids.iter().any(|candidate| candidate == id),
        })
    }

    /// Order matched documents by the sort field, if any. Stable, so ties keep
    /// key order.
    pub fn sort(&self, docs: &mut [Value]) {
        if let Some(field) = &self.sort_by {
            docs.sort_by(|a, b| compare_values(a.get(field), b.get(field)));
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
        },
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Key of a stored document.
pub fn doc_id(doc: &Value) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}
