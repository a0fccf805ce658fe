//! Transaction retry engine.
//!
//! A builder closure is told which attempt it is on (0-based) and returns the
//! operations to submit. Attempt 0 may trust the caller's preconditions;
//! every later attempt exists because a concurrent writer invalidated an
//! assertion, so the builder must re-read the store and either produce a
//! corrected batch or return [`StoreError::NoOperations`] to stop cleanly.
//! Builders must not carry side effects from one attempt into the next.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::ops::Op;
use crate::store::DocumentStore;

/// Smallest usable budget: the first attempt plus one pass in which the
/// builder can resolve a conflict.
pub const MIN_ATTEMPTS: u32 = 2;

/// Retry budget for a transaction run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts made before giving up with [`StoreError::Exhausted`].
    /// Values below [`MIN_ATTEMPTS`] are raised to it.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// The budget a run actually gets.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(MIN_ATTEMPTS)
    }
}

/// Drives builder closures against a [`DocumentStore`] until a batch commits,
/// the builder opts out, or the retry budget runs out.
pub struct TxnRunner<S> {
    store: Arc<S>,
    config: RetryConfig,
}

impl<S> Clone for TxnRunner<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
        }
    }
}

impl<S: DocumentStore> TxnRunner<S> {
    pub fn new(store: Arc<S>, config: RetryConfig) -> Self {
        Self { store, config }
    }

    /// The store transactions are submitted to, for builder-side reads.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run `build` until its operations commit.
    ///
    /// An empty batch is treated like [`StoreError::NoOperations`]: the run
    /// ends successfully without writing. Builder errors other than
    /// `NoOperations` and store errors other than `Aborted` are returned
    /// unchanged.
    pub fn run<F>(&self, mut build: F) -> StoreResult<()>
    where
        F: FnMut(u32) -> StoreResult<Vec<Op>>,
    {
        let attempts = self.config.attempts();
        for attempt in 0..attempts {
            let ops = match build(attempt) {
                Ok(ops) => ops,
                Err(StoreError::NoOperations) => {
                    debug!(attempt, "transaction builder has no operations");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            if ops.is_empty() {
                debug!(attempt, "transaction builder returned an empty batch");
                return Ok(());
            }

            match self.store.apply(&ops) {
                Ok(()) => {
                    debug!(attempt, ops = ops.len(), "transaction committed");
                    return Ok(());
                }
                Err(StoreError::Aborted { collection, id }) => {
                    debug!(attempt, %collection, %id, "transaction aborted");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(attempts, "transaction retries exhausted");
        Err(StoreError::Exhausted { attempts })
    }
}
