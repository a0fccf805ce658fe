//! Domain types for workload processes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{PersistError, PersistResult};

/// Resource shape requested by a process definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceShape {
    /// Memory limit in bytes.
    pub memory_bytes: u64,
    /// CPU weight (relative, higher = more CPU time).
    pub cpu_weight: u32,
}

/// A named kind of workload process declared by a deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProcessDefinition {
    pub name: String,
    pub description: String,
    /// Launch plugin responsible for the process (e.g. "docker").
    pub kind: String,
    pub resources: Option<ResourceShape>,
    pub env: BTreeMap<String, String>,
}

impl ProcessDefinition {
    /// A definition that carries nothing but its name.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> PersistResult<()> {
        if self.name.is_empty() {
            return Err(PersistError::NotValid("process definition with empty name".to_string()));
        }
        if self.name.contains('/') {
            return Err(PersistError::NotValid(format!(
                "process definition name {:?} (contains '/')",
                self.name
            )));
        }
        Ok(())
    }
}

/// What the launch plugin reported when it started the process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LaunchDetails {
    /// Identifier assigned by the launch plugin.
    pub plugin_id: String,
    pub image: String,
    pub command: String,
}

/// Lifecycle state reported for a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    #[default]
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

/// Mutable runtime status of a process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProcessStatus {
    pub state: ProcessState,
    pub message: String,
}

/// Whether a process is in service or being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Life {
    #[default]
    Alive,
    Dying,
}

/// A fully reconstructed process instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessInfo {
    pub definition: ProcessDefinition,
    pub details: LaunchDetails,
    pub status: ProcessStatus,
    pub life: Life,
}

impl ProcessInfo {
    pub fn new(definition: ProcessDefinition, details: LaunchDetails) -> Self {
        Self {
            definition,
            details,
            status: ProcessStatus::default(),
            life: Life::Alive,
        }
    }

    /// Process instance id: `{definition name}/{plugin id}`.
    pub fn id(&self) -> String {
        format!("{}/{}", self.definition.name, self.details.plugin_id)
    }

    pub fn validate(&self) -> PersistResult<()> {
        self.definition.validate()?;
        if self.details.plugin_id.is_empty() {
            return Err(PersistError::NotValid(format!(
                "process {:?} with empty plugin id",
                self.definition.name
            )));
        }
        Ok(())
    }
}

/// Split a process instance id into definition name and plugin id.
///
/// Ids without a separator are treated as a bare definition name.
pub fn split_id(id: &str) -> (&str, &str) {
    id.split_once('/').unwrap_or((id, ""))
}

/// One result of listing everything in scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEntry {
    Instance(ProcessInfo),
    /// A registered definition without any instance.
    Definition(ProcessDefinition),
}

/// Outcome of registering a batch of definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsuredDefinitions {
    /// Names that were already registered.
    pub found: Vec<String>,
    /// Subset of `found` whose stored definition differs from the proposed one.
    pub mismatched: Vec<String>,
}
