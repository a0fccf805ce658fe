//! Rebuilding processes from independently stored documents.
//!
//! Pure: works on lookup maps that the caller filled from the store, so the
//! classification can be tested without one.

use std::collections::HashMap;
use std::fmt;

use super::docs::{DefinitionDoc, LaunchDoc, ProcessDoc};
use super::types::{split_id, ProcessDefinition, ProcessInfo};

/// Kinds of document a process instance is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocKind {
    Launch,
    Process,
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocKind::Launch => f.write_str("launch"),
            DocKind::Process => f.write_str("process"),
        }
    }
}

/// Documents that must all exist for an instance to be present. The
/// definition is shared and may exist without instances, so it is not one
/// of them.
pub const REQUIRED_KINDS: [DocKind; 2] = [DocKind::Launch, DocKind::Process];

/// Documents of one scope, indexed for reconciliation.
#[derive(Debug, Default)]
pub struct DocIndex {
    /// By definition name.
    pub definitions: HashMap<String, DefinitionDoc>,
    /// By process id.
    pub launches: HashMap<String, LaunchDoc>,
    /// By process id.
    pub procs: HashMap<String, ProcessDoc>,
}

impl DocIndex {
    pub fn new(
        definitions: Vec<DefinitionDoc>,
        launches: Vec<LaunchDoc>,
        procs: Vec<ProcessDoc>,
    ) -> Self {
        Self {
            definitions: definitions
                .into_iter()
                .map(|doc| (doc.name.clone(), doc))
                .collect(),
            launches: launches
                .into_iter()
                .map(|doc| (doc.process_id.clone(), doc))
                .collect(),
            procs: procs
                .into_iter()
                .map(|doc| (doc.process_id.clone(), doc))
                .collect(),
        }
    }
}

/// Classification of one process id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Present(ProcessInfo),
    /// None of the required documents exist.
    Absent,
    /// Some, but not all, of the required documents exist.
    Inconsistent { missing: Vec<DocKind> },
}

/// Classify `id` against the indexed documents and rebuild it when complete.
///
/// When the definition document is gone but both instance documents exist,
/// the instance is still present and carries a definition holding only the
/// name recorded at launch.
pub fn reconcile(id: &str, index: &DocIndex) -> Reconciled {
    let launch = index.launches.get(id);
    let proc = index.procs.get(id);

    let missing: Vec<DocKind> = REQUIRED_KINDS
        .into_iter()
        .filter(|kind| match kind {
            DocKind::Launch => launch.is_none(),
            DocKind::Process => proc.is_none(),
        })
        .collect();

    let (Some(launch), Some(proc)) = (launch, proc) else {
        if missing.len() == REQUIRED_KINDS.len() {
            return Reconciled::Absent;
        }
        return Reconciled::Inconsistent { missing };
    };

    let name = if launch.name.is_empty() {
        split_id(id).0
    } else {
        launch.name.as_str()
    };
    let definition = index
        .definitions
        .get(name)
        .map(DefinitionDoc::definition)
        .unwrap_or_else(|| ProcessDefinition::named(name));

    Reconciled::Present(ProcessInfo {
        definition,
        details: launch.details(),
        status: proc.status(),
        life: proc.life,
    })
}
