//! warpgrid-docstore — document store adapter for WarpGrid persistence.
//!
//! Documents are JSON objects grouped into named collections and keyed by a
//! string id. Writes never go to the store directly: callers assemble a batch
//! of assertion-guarded [`Op`]s and hand a builder closure to a [`TxnRunner`],
//! which submits the batch atomically and re-invokes the builder with the next
//! attempt number whenever a concurrent writer invalidated an assertion.
//!
//! # Architecture
//!
//! ```text
//! business operation
//!   └── TxnRunner::run(|attempt| -> ops)
//!         └── DocumentStore::apply(&[Op])    (all-or-nothing)
//!               └── RedbDocStore             (one redb table per collection)
//! ```
//!
//! [`RedbDocStore`] is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and supports both on-disk and in-memory backends.

pub mod config;
pub mod error;
pub mod ops;
pub mod query;
pub mod redb_store;
pub mod store;
pub mod txn;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use ops::{Assert, Change, Op};
pub use query::Query;
pub use redb_store::RedbDocStore;
pub use store::DocumentStore;
pub use txn::{MIN_ATTEMPTS, RetryConfig, TxnRunner};
