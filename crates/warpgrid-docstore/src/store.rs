//! The document store adapter interface consumed by the persistence layer.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{StoreError, StoreResult};
use crate::ops::Op;
use crate::query::Query;

/// Point lookups, filtered lookups and atomic batch application over named
/// collections of JSON documents.
///
/// Implementations must make [`DocumentStore::apply`] all-or-nothing: either
/// every assertion of the batch holds and every change is committed, or
/// nothing is written and [`StoreError::Aborted`] names the first failing
/// operation.
pub trait DocumentStore: Send + Sync {
    /// Fetch the document stored under `id`. Missing documents are
    /// [`StoreError::NotFound`].
    fn fetch_one(&self, collection: &str, id: &str) -> StoreResult<Value>;

    /// Fetch every document of `collection` matching `query`. A collection
    /// that was never written to is empty.
    fn fetch_all(&self, collection: &str, query: &Query) -> StoreResult<Vec<Value>>;

    /// Atomically check and apply a batch of operations, in order.
    fn apply(&self, ops: &[Op]) -> StoreResult<()>;

    /// Typed variant of [`DocumentStore::fetch_one`].
    fn fetch_one_as<T: DeserializeOwned>(&self, collection: &str, id: &str) -> StoreResult<T>
    where
        Self: Sized,
    {
        let doc = self.fetch_one(collection, id)?;
        serde_json::from_value(doc).map_err(|e| StoreError::Deserialize(e.to_string()))
    }

    /// Typed variant of [`DocumentStore::fetch_all`].
    fn fetch_all_as<T: DeserializeOwned>(&self, collection: &str, query: &Query) -> StoreResult<Vec<T>>
    where
        Self: Sized,
    {
        self.fetch_all(collection, query)?
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(|e| StoreError::Deserialize(e.to_string())))
            .collect()
    }
}
