//! Stored document shapes for workload processes.
//!
//! A process instance is spread over three collections:
//!
//! | collection            | key                             | shared by          |
//! |-----------------------|---------------------------------|--------------------|
//! | `process_definitions` | `{deployment}#definition#{name}`| all instances      |
//! | `process_launches`    | `{unit}#launch#{process id}`    | one instance       |
//! | `processes`           | `{unit}#process#{process id}`   | one instance       |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::*;

pub const DEFINITIONS: &str = "process_definitions";
pub const LAUNCHES: &str = "process_launches";
pub const PROCESSES: &str = "processes";

/// Owner of the documents a persistence handle reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// Owner of the definitions.
    pub deployment: String,
    /// Owner of the process instances.
    pub unit: String,
}

impl Scope {
    pub fn new(deployment: &str, unit: &str) -> Self {
        Self {
            deployment: deployment.to_string(),
            unit: unit.to_string(),
        }
    }

    pub fn definition_doc_id(&self, name: &str) -> String {
        format!("{}#definition#{name}", self.deployment)
    }

    pub fn launch_doc_id(&self, id: &str) -> String {
        format!("{}#launch#{id}", self.unit)
    }

    pub fn process_doc_id(&self, id: &str) -> String {
        format!("{}#process#{id}", self.unit)
    }

    pub fn definition_doc(&self, definition: &ProcessDefinition) -> DefinitionDoc {
        DefinitionDoc {
            doc_id: self.definition_doc_id(&definition.name),
            deployment: self.deployment.clone(),
            name: definition.name.clone(),
            description: definition.description.clone(),
            kind: definition.kind.clone(),
            resources: definition.resources.clone(),
            env: definition.env.clone(),
        }
    }

    pub fn launch_doc(&self, info: &ProcessInfo) -> LaunchDoc {
        let id = info.id();
        LaunchDoc {
            doc_id: self.launch_doc_id(&id),
            unit: self.unit.clone(),
            process_id: id,
            name: info.definition.name.clone(),
            plugin_id: info.details.plugin_id.clone(),
            image: info.details.image.clone(),
            command: info.details.command.clone(),
        }
    }

    pub fn process_doc(&self, info: &ProcessInfo) -> ProcessDoc {
        let id = info.id();
        ProcessDoc {
            doc_id: self.process_doc_id(&id),
            unit: self.unit.clone(),
            process_id: id,
            life: info.life,
            state: info.status.state,
            message: info.status.message.clone(),
        }
    }
}

/// Immutable once registered; compared field-for-field on re-registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DefinitionDoc {
    #[serde(rename = "_id")]
    pub doc_id: String,
    pub deployment: String,
    pub name: String,
    pub description: String,
    pub kind: String,
    pub resources: Option<ResourceShape>,
    pub env: BTreeMap<String, String>,
}

impl DefinitionDoc {
    pub fn definition(&self) -> ProcessDefinition {
        ProcessDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            kind: self.kind.clone(),
            resources: self.resources.clone(),
            env: self.env.clone(),
        }
    }
}

/// Launch-time details of one process instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchDoc {
    #[serde(rename = "_id")]
    pub doc_id: String,
    pub unit: String,
    pub process_id: String,
    /// Definition name.
    pub name: String,
    pub plugin_id: String,
    pub image: String,
    pub command: String,
}

impl LaunchDoc {
    pub fn details(&self) -> LaunchDetails {
        LaunchDetails {
            plugin_id: self.plugin_id.clone(),
            image: self.image.clone(),
            command: self.command.clone(),
        }
    }
}

/// Mutable runtime state of one process instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessDoc {
    #[serde(rename = "_id")]
    pub doc_id: String,
    pub unit: String,
    pub process_id: String,
    pub life: Life,
    pub state: ProcessState,
    pub message: String,
}

impl ProcessDoc {
    pub fn status(&self) -> ProcessStatus {
        ProcessStatus {
            state: self.state,
            message: self.message.clone(),
        }
    }
}
