//! ProcessPersistence — workload process records in the document store.
//!
//! Writes are optimistic: the first attempt of every transaction assumes the
//! caller's preconditions, and a conflict sends the builder back to the store
//! to find out what actually happened. Conflicts that map onto a business
//! outcome (already registered, already inserted, already gone, terminating)
//! are resolved here; anything else reaches the caller as an error.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, warn};
use warpgrid_docstore::{DocumentStore, Query, StoreError, StoreResult, TxnRunner};

use super::docs::*;
use super::ops::*;
use super::reconcile::{reconcile, DocIndex, Reconciled};
use super::types::*;
use crate::error::{PersistError, PersistResult};

/// Process persistence for one deployment and unit.
pub struct ProcessPersistence<S> {
    runner: TxnRunner<S>,
    scope: Scope,
}

impl<S: DocumentStore> ProcessPersistence<S> {
    pub fn new(runner: TxnRunner<S>, deployment: &str, unit: &str) -> Self {
        Self {
            runner,
            scope: Scope::new(deployment, unit),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    fn store(&self) -> &S {
        self.runner.store()
    }

    // ── Writes ─────────────────────────────────────────────────────

    /// Register definitions that are not stored yet.
    ///
    /// Existing definitions are never overwritten. Their names are reported
    /// in `found`, and additionally in `mismatched` when the stored
    /// definition differs from the proposed one.
    pub fn ensure_definitions(
        &self,
        definitions: &[ProcessDefinition],
    ) -> PersistResult<EnsuredDefinitions> {
        let mut outcome = EnsuredDefinitions::default();
        if definitions.is_empty() {
            return Ok(outcome);
        }

        let mut names = HashSet::new();
        for definition in definitions {
            definition.validate()?;
            if !names.insert(definition.name.as_str()) {
                return Err(PersistError::NotValid(format!(
                    "duplicate process definition {:?}",
                    definition.name
                )));
            }
        }
        let proposed: Vec<DefinitionDoc> = definitions
            .iter()
            .map(|definition| self.scope.definition_doc(definition))
            .collect();

        self.runner
            .run(|attempt| {
                if attempt == 0 {
                    return definitions
                        .iter()
                        .map(|definition| insert_definition_op(&self.scope, definition))
                        .collect();
                }

                // Some definitions appeared since the batch was built: drop
                // their inserts and compare them against the proposals.
                outcome = EnsuredDefinitions::default();
                let ids: Vec<&str> = proposed.iter().map(|doc| doc.doc_id.as_str()).collect();
                let stored = DocIndex::new(self.definition_docs(&ids)?, Vec::new(), Vec::new());

                let mut ops = Vec::new();
                for (doc, definition) in proposed.iter().zip(definitions) {
                    match stored.definitions.get(&doc.name) {
                        None => ops.push(insert_definition_op(&self.scope, definition)?),
                        Some(existing) => {
                            outcome.found.push(doc.name.clone());
                            if existing != doc {
                                outcome.mismatched.push(doc.name.clone());
                            }
                        }
                    }
                }
                if ops.is_empty() {
                    return Err(StoreError::NoOperations);
                }
                Ok(ops)
            })
            .map_err(PersistError::annotate("cannot ensure process definitions"))?;

        if !outcome.mismatched.is_empty() {
            warn!(
                deployment = %self.scope.deployment,
                mismatched = ?outcome.mismatched,
                "stored process definitions differ from proposed ones"
            );
        }
        debug!(
            deployment = %self.scope.deployment,
            proposed = definitions.len(),
            found = outcome.found.len(),
            "process definitions ensured"
        );
        Ok(outcome)
    }

    /// Add the records of a new process. Returns false when the process is
    /// already stored; existing records are not compared with `info`.
    pub fn insert(&self, info: &ProcessInfo) -> PersistResult<bool> {
        info.validate()?;
        let id = info.id();
        let ops = insert_process_ops(&self.scope, info)
            .map_err(PersistError::annotate(format!("cannot insert process {id:?}")))?;

        let mut inserted = false;
        self.runner
            .run(|attempt| {
                if attempt > 0 {
                    // One of the records already exists.
                    inserted = false;
                    return Err(StoreError::NoOperations);
                }
                inserted = true;
                Ok(ops.clone())
            })
            .map_err(PersistError::annotate(format!("cannot insert process {id:?}")))?;

        debug!(unit = %self.scope.unit, %id, inserted, "process insert");
        Ok(inserted)
    }

    /// Replace the status of a process. Returns false when the process is not
    /// stored. Updates for a dying process are dropped without error.
    pub fn set_status(&self, id: &str, status: &ProcessStatus) -> PersistResult<bool> {
        let context = format!("cannot set status of process {id:?}");
        let ops = set_status_ops(&self.scope, id, status)
            .map_err(PersistError::annotate(context.as_str()))?;

        let mut found = false;
        self.runner
            .run(|attempt| {
                if attempt > 0 {
                    found = self.process_doc(id)?.is_some();
                    if found {
                        debug!(%id, "process is dying, status update ignored");
                    }
                    return Err(StoreError::NoOperations);
                }
                found = true;
                Ok(ops.clone())
            })
            .map_err(PersistError::annotate(context))?;
        Ok(found)
    }

    /// Start tearing a process down. Returns false when the process is not
    /// stored; marking a dying process again is a no-op.
    pub fn mark_dying(&self, id: &str) -> PersistResult<bool> {
        let context = format!("cannot mark process {id:?} as dying");
        let ops = mark_dying_ops(&self.scope, id)
            .map_err(PersistError::annotate(context.as_str()))?;

        let mut found = false;
        self.runner
            .run(|attempt| {
                if attempt > 0 {
                    found = self.process_doc(id)?.is_some();
                    return Err(StoreError::NoOperations);
                }
                found = true;
                Ok(ops.clone())
            })
            .map_err(PersistError::annotate(context))?;
        Ok(found)
    }

    /// Delete the records of a process. Returns whether it was found.
    ///
    /// The first attempt deletes the records whatever the process's life.
    /// After a conflict the records are re-read: a dying process is then
    /// reported as found and left to whoever is tearing it down, and records
    /// that are only partially present are [`PersistError::NotValid`].
    pub fn remove(&self, id: &str) -> PersistResult<bool> {
        let context = format!("cannot remove process {id:?}");
        let mut found = false;
        let mut invalid = None;

        self.runner
            .run(|attempt| {
                if attempt == 0 {
                    found = true;
                    return Ok(remove_process_ops(&self.scope, id));
                }
                match self.check_records(id)? {
                    Reconciled::Absent => {
                        found = false;
                        Err(StoreError::NoOperations)
                    }
                    Reconciled::Present(info) if info.life == Life::Dying => {
                        found = true;
                        Err(StoreError::NoOperations)
                    }
                    Reconciled::Present(_) => {
                        found = true;
                        Ok(remove_process_ops(&self.scope, id))
                    }
                    Reconciled::Inconsistent { missing } => {
                        invalid = Some(inconsistent(id, &missing));
                        Err(StoreError::NoOperations)
                    }
                }
            })
            .map_err(PersistError::annotate(context))?;

        if let Some(err) = invalid {
            return Err(err);
        }
        debug!(unit = %self.scope.unit, %id, found, "process remove");
        Ok(found)
    }

    // ── Reads ──────────────────────────────────────────────────────

    /// Rebuild the processes with the given ids.
    ///
    /// Ids without any record are returned as missing. An id with only part
    /// of its records fails the whole call with [`PersistError::NotValid`].
    ///
    /// The three collections are read one after another without a snapshot,
    /// so a concurrent insert or remove can surface as an inconsistency.
    pub fn list(&self, ids: &[&str]) -> PersistResult<(Vec<ProcessInfo>, Vec<String>)> {
        let names: Vec<String> = ids
            .iter()
            .map(|id| self.scope.definition_doc_id(split_id(id).0))
            .collect();
        let launch_ids: Vec<String> = ids.iter().map(|id| self.scope.launch_doc_id(id)).collect();
        let proc_ids: Vec<String> = ids.iter().map(|id| self.scope.process_doc_id(id)).collect();

        let index = DocIndex::new(
            self.definition_docs(&names)
                .map_err(PersistError::annotate("cannot list process definitions"))?,
            self.store()
                .fetch_all_as(LAUNCHES, &Query::all().ids(&launch_ids))
                .map_err(PersistError::annotate("cannot list process launches"))?,
            self.store()
                .fetch_all_as(PROCESSES, &Query::all().ids(&proc_ids))
                .map_err(PersistError::annotate("cannot list processes"))?,
        );

        let mut results = Vec::new();
        let mut missing = Vec::new();
        for id in ids {
            match reconcile(id, &index) {
                Reconciled::Present(info) => results.push(info),
                Reconciled::Absent => missing.push(id.to_string()),
                Reconciled::Inconsistent { missing: kinds } => return Err(inconsistent(id, &kinds)),
            }
        }
        Ok((results, missing))
    }

    /// Every process of the unit, plus the deployment's definitions that have
    /// no instance.
    pub fn list_all(&self) -> PersistResult<Vec<ProcessEntry>> {
        let index = DocIndex::new(
            self.store()
                .fetch_all_as(
                    DEFINITIONS,
                    &Query::all().eq("deployment", self.scope.deployment.as_str()),
                )
                .map_err(PersistError::annotate("cannot list process definitions"))?,
            self.store()
                .fetch_all_as(LAUNCHES, &self.unit_query())
                .map_err(PersistError::annotate("cannot list process launches"))?,
            self.store()
                .fetch_all_as(PROCESSES, &self.unit_query())
                .map_err(PersistError::annotate("cannot list processes"))?,
        );

        let ids: BTreeSet<&String> = index.launches.keys().chain(index.procs.keys()).collect();
        let mut results = Vec::new();
        let mut instantiated = HashSet::new();
        for id in ids {
            match reconcile(id, &index) {
                Reconciled::Present(info) => {
                    instantiated.insert(info.definition.name.clone());
                    results.push(ProcessEntry::Instance(info));
                }
                Reconciled::Absent => {}
                Reconciled::Inconsistent { missing } => return Err(inconsistent(id, &missing)),
            }
        }

        let mut idle: Vec<&DefinitionDoc> = index
            .definitions
            .values()
            .filter(|doc| !instantiated.contains(&doc.name))
            .collect();
        idle.sort_by(|a, b| a.name.cmp(&b.name));
        results.extend(idle.into_iter().map(|doc| ProcessEntry::Definition(doc.definition())));
        Ok(results)
    }

    // ── Helpers ────────────────────────────────────────────────────

    fn unit_query(&self) -> Query {
        Query::all().eq("unit", self.scope.unit.as_str())
    }

    fn definition_docs<I: AsRef<str>>(&self, ids: &[I]) -> StoreResult<Vec<DefinitionDoc>> {
        self.store()
            .fetch_all_as(DEFINITIONS, &Query::all().ids(ids))
    }

    fn process_doc(&self, id: &str) -> StoreResult<Option<ProcessDoc>> {
        optional(self.store().fetch_one_as(PROCESSES, &self.scope.process_doc_id(id)))
    }

    fn launch_doc(&self, id: &str) -> StoreResult<Option<LaunchDoc>> {
        optional(self.store().fetch_one_as(LAUNCHES, &self.scope.launch_doc_id(id)))
    }

    /// Classify the current instance records of `id`.
    fn check_records(&self, id: &str) -> StoreResult<Reconciled> {
        let launches = self.launch_doc(id)?.into_iter().collect();
        let procs = self.process_doc(id)?.into_iter().collect();
        Ok(reconcile(id, &DocIndex::new(Vec::new(), launches, procs)))
    }
}

fn optional<T>(result: StoreResult<T>) -> StoreResult<Option<T>> {
    match result {
        Ok(doc) => Ok(Some(doc)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

fn inconsistent(id: &str, missing: &[super::reconcile::DocKind]) -> PersistError {
    let missing: Vec<String> = missing.iter().map(ToString::to_string).collect();
    warn!(%id, missing = ?missing, "inconsistent process records");
    PersistError::NotValid(format!(
        "records for process {id:?} (missing {})",
        missing.join(", ")
    ))
}
