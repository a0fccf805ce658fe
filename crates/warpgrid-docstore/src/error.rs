//! Error types for the WarpGrid document store.

use thiserror::Error;

/// Result type alias for document store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during document store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    /// An assertion of a submitted batch did not hold at commit time.
    #[error("transaction aborted: assertion failed for {collection}/{id}")]
    Aborted { collection: String, id: String },

    /// Returned by a transaction builder to end the run without writing.
    #[error("no transaction operations are available")]
    NoOperations,

    /// Every attempt allowed by the retry budget was aborted.
    #[error("transaction still conflicting after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Conflicts that a caller may resolve by retrying the whole operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Aborted { .. } | Self::Exhausted { .. })
    }
}
