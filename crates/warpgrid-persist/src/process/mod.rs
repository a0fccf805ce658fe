//! Workload process persistence.

pub mod docs;
pub mod ops;
pub mod persistence;
pub mod reconcile;
pub mod types;

pub use persistence::ProcessPersistence;
pub use reconcile::{reconcile, DocIndex, DocKind, Reconciled, REQUIRED_KINDS};
pub use types::*;
