//! warpgrid-persist — persistence of workload processes and cloud image
//! metadata.
//!
//! Both stores sit on a [`warpgrid_docstore::DocumentStore`] and write only
//! through assertion-guarded batches driven by a
//! [`warpgrid_docstore::TxnRunner`]:
//!
//! - [`ProcessPersistence`] spreads one logical process over a definition
//!   document (shared by every instance of the definition), a launch document
//!   and a process-state document, and reconstructs processes from those
//!   documents with the pure [`reconcile`] function.
//! - [`ImageMetadataStorage`] keeps one document per natural key and behaves
//!   as save-or-update.
//!
//! No state is held between calls: each operation starts from a fresh read or
//! the identifiers it is given.

pub mod error;
pub mod imagemeta;
pub mod process;

pub use error::{PersistError, PersistResult};
pub use imagemeta::{ImageMetadataStorage, Metadata, MetadataAttributes, MetadataFilter};
pub use process::{
    reconcile, EnsuredDefinitions, Life, ProcessDefinition, ProcessEntry, ProcessInfo,
    ProcessPersistence, ProcessState, ProcessStatus, Reconciled,
};
