//! Error types for WarpGrid persistence.

use thiserror::Error;
use warpgrid_docstore::StoreError;

/// Result type alias for persistence operations.
pub type PersistResult<T> = Result<T, PersistError>;

/// Errors surfaced to callers of the persistence layer.
///
/// Expected absences that have a defined business outcome are reported
/// through return values (`found = false`, `missing` ids); these variants
/// cover everything else.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{0} not found")]
    NotFound(String),

    /// Partial document sets or malformed input.
    #[error("{0} not valid")]
    NotValid(String),

    /// The retry budget ran out while other writers kept changing state.
    #[error("{context}: state changing too quickly after {attempts} attempts, try again")]
    Conflict { context: String, attempts: u32 },

    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },
}

impl PersistError {
    /// Build a closure that wraps a store error with `context`, keeping
    /// exhausted retries distinguishable as [`PersistError::Conflict`].
    pub fn annotate(context: impl Into<String>) -> impl FnOnce(StoreError) -> PersistError {
        let context = context.into();
        move |err| match err {
            StoreError::Exhausted { attempts } => PersistError::Conflict { context, attempts },
            StoreError::NotFound { collection, id } => {
                PersistError::NotFound(format!("{context}: {collection}/{id}"))
            }
            source => PersistError::Store { context, source },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_not_valid(&self) -> bool {
        matches!(self, Self::NotValid(_))
    }

    /// Whether retrying the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_retries_become_conflicts() {
        let err = PersistError::annotate("saving")(StoreError::Exhausted { attempts: 3 });
        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "saving: state changing too quickly after 3 attempts, try again"
        );
    }

    #[test]
    fn store_failures_keep_their_source() {
        let err = PersistError::annotate("listing")(StoreError::Read("disk gone".to_string()));
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "listing: read error: disk gone");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn missing_documents_become_not_found() {
        let err = PersistError::annotate("reading")(StoreError::not_found("docs", "a"));
        assert!(err.is_not_found());
    }
}
