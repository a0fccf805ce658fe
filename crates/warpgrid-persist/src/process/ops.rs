//! Assertion-guarded operations for process documents.
//!
//! Nothing here touches the store; the functions only assemble batches.

use serde_json::json;
use warpgrid_docstore::{Op, StoreResult};

use super::docs::*;
use super::types::*;

/// Register a definition unless one with the same name exists.
pub fn insert_definition_op(scope: &Scope, definition: &ProcessDefinition) -> StoreResult<Op> {
    let doc = scope.definition_doc(definition);
    Op::insert(DEFINITIONS, &doc.doc_id, &doc)
}

/// Create the launch and process-state documents of a new process.
pub fn insert_process_ops(scope: &Scope, info: &ProcessInfo) -> StoreResult<Vec<Op>> {
    let launch = scope.launch_doc(info);
    let proc = scope.process_doc(info);
    Ok(vec![
        Op::insert(LAUNCHES, &launch.doc_id, &launch)?,
        Op::insert(PROCESSES, &proc.doc_id, &proc)?,
    ])
}

/// Replace the status of a process that is still alive and launched.
pub fn set_status_ops(scope: &Scope, id: &str, status: &ProcessStatus) -> StoreResult<Vec<Op>> {
    Ok(vec![
        Op::assert_exists(LAUNCHES, &scope.launch_doc_id(id)),
        Op::update_where(
            PROCESSES,
            &scope.process_doc_id(id),
            json!({"life": Life::Alive}),
            json!({"state": status.state, "message": status.message}),
        )?,
    ])
}

/// Move an alive, launched process to dying.
pub fn mark_dying_ops(scope: &Scope, id: &str) -> StoreResult<Vec<Op>> {
    Ok(vec![
        Op::assert_exists(LAUNCHES, &scope.launch_doc_id(id)),
        Op::update_where(
            PROCESSES,
            &scope.process_doc_id(id),
            json!({"life": Life::Alive}),
            json!({"life": Life::Dying}),
        )?,
    ])
}

/// Delete the per-instance documents. The shared definition stays.
pub fn remove_process_ops(scope: &Scope, id: &str) -> Vec<Op> {
    vec![
        Op::remove(LAUNCHES, &scope.launch_doc_id(id)),
        Op::remove(PROCESSES, &scope.process_doc_id(id)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use warpgrid_docstore::{Assert, Change};

    fn scope() -> Scope {
        Scope::new("shop", "shop/0")
    }

    fn info() -> ProcessInfo {
        ProcessInfo::new(
            ProcessDefinition::named("web"),
            LaunchDetails {
                plugin_id: "c1".to_string(),
                image: "web:1".to_string(),
                command: "serve".to_string(),
            },
        )
    }

    #[test]
    fn insert_ops_assert_absence_of_both_documents() {
        let ops = insert_process_ops(&scope(), &info()).unwrap();

        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].collection(), LAUNCHES);
        assert_eq!(ops[0].id(), "shop/0#launch#web/c1");
        assert_eq!(ops[1].collection(), PROCESSES);
        assert!(ops.iter().all(|op| *op.assertion() == Assert::DocMissing));
    }

    #[test]
    fn definition_op_is_keyed_by_deployment_and_name() {
        let op = insert_definition_op(&scope(), &ProcessDefinition::named("web")).unwrap();
        assert_eq!(op.id(), "shop#definition#web");
        assert_eq!(op.inserted().unwrap()["name"], "web");
    }

    #[test]
    fn status_update_requires_alive_process() {
        let status = ProcessStatus {
            state: ProcessState::Running,
            message: "ok".to_string(),
        };
        let ops = set_status_ops(&scope(), "web/c1", &status).unwrap();

        assert_eq!(ops[0].collection(), LAUNCHES);
        assert_eq!(*ops[0].assertion(), Assert::DocExists);
        assert_eq!(*ops[0].change(), Change::None);
        match ops[1].assertion() {
            Assert::Matches(fields) => assert_eq!(fields["life"], "alive"),
            other => panic!("unexpected assertion {other:?}"),
        }
        match ops[1].change() {
            Change::Update(set) => {
                assert_eq!(set["state"], "running");
                assert!(!set.contains_key("life"));
            }
            other => panic!("unexpected change {other:?}"),
        }
    }

    #[test]
    fn remove_ops_leave_definition_alone() {
        let ops = remove_process_ops(&scope(), "web/c1");
        assert!(ops.iter().all(|op| op.collection() != DEFINITIONS));
        assert!(ops.iter().all(|op| *op.assertion() == Assert::DocExists));
    }
}
