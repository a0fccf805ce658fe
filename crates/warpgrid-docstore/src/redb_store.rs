//! RedbDocStore — redb-backed document store.
//!
//! Each collection is a redb table with `&str` keys and JSON-serialized
//! `&[u8]` values. Tables are created by the first write that touches them;
//! reads of a collection that does not exist yet see an empty collection.
//! A batch of operations runs inside one redb write transaction, which
//! serializes concurrent writers and makes every batch all-or-nothing.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, TableError};
use serde_json::Value;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::ops::{Change, Op};
use crate::query::Query;
use crate::store::DocumentStore;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

fn table_def(collection: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(collection)
}

/// Thread-safe document store backed by redb.
#[derive(Clone)]
pub struct RedbDocStore {
    db: Arc<Database>,
}

impl RedbDocStore {
    /// Open (or create) a persistent document store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        debug!(?path, "document store opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Create an ephemeral in-memory document store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        debug!("in-memory document store opened");
        Ok(Self { db: Arc::new(db) })
    }
}

impl DocumentStore for RedbDocStore {
    fn fetch_one(&self, collection: &str, id: &str) -> StoreResult<Value> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = match txn.open_table(table_def(collection)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => {
                return Err(StoreError::not_found(collection, id));
            }
            Err(e) => return Err(StoreError::Table(e.to_string())),
        };
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize)),
            None => Err(StoreError::not_found(collection, id)),
        }
    }

    fn fetch_all(&self, collection: &str, query: &Query) -> StoreResult<Vec<Value>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = match txn.open_table(table_def(collection)) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Table(e.to_string())),
        };
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            let doc: Value = serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if query.matches(key.value(), &doc) {
                results.push(doc);
            }
        }
        query.sort(&mut results);
        Ok(results)
    }

    fn apply(&self, ops: &[Op]) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        for op in ops {
            let mut table = txn
                .open_table(table_def(op.collection()))
                .map_err(map_err!(Table))?;
            let current: Option<Value> = match table.get(op.id()).map_err(map_err!(Read))? {
                Some(guard) => {
                    Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                }
                None => None,
            };

            if !op.assertion().holds(current.as_ref()) {
                drop(table);
                txn.abort().map_err(map_err!(Transaction))?;
                debug!(collection = op.collection(), id = op.id(), "assertion failed, batch rolled back");
                return Err(StoreError::Aborted {
                    collection: op.collection().to_string(),
                    id: op.id().to_string(),
                });
            }
            if *op.change() == Change::None {
                continue;
            }

            match op.change().apply(op.id(), current) {
                Some(doc) => {
                    let value = serde_json::to_vec(&doc).map_err(map_err!(Serialize))?;
                    table
                        .insert(op.id(), value.as_slice())
                        .map_err(map_err!(Write))?;
                }
                None => {
                    table.remove(op.id()).map_err(map_err!(Write))?;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(ops = ops.len(), "batch committed");
        Ok(())
    }
}
