//! End-to-end tests for `BoundaryEngine::execute_within_subgraph` over the
//! in-memory store.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;
use warden_boundary::{AuthorizationError, BoundaryEngine, BoundaryError};
use warden_core::{
    AgentId, CrudOperation, IsolationLevel, Params, Record, RuleOptions, Subgraph,
    SubgraphDefinition, WorkspaceId,
};
use warden_graph::MemoryStore;

const WORKSPACE: &str = "ws-acme";

fn task_definition(isolation: IsolationLevel) -> SubgraphDefinition {
    SubgraphDefinition {
        included_node_types: Some(BTreeSet::from(["Task".to_string()])),
        included_relationship_types: Some(BTreeSet::from(["HAS_SUBTASK".to_string()])),
        crud_permissions: Some(BTreeSet::from([CrudOperation::Read, CrudOperation::Create])),
        isolation_level: Some(isolation),
        boundary_constraints: Some(vec!["t.workspaceId = $workspaceId".to_string()]),
        ..Default::default()
    }
}

async fn setup(definition: SubgraphDefinition) -> (Arc<MemoryStore>, BoundaryEngine, Subgraph) {
    let store = Arc::new(MemoryStore::new());
    let engine = BoundaryEngine::new(store.clone());
    let subgraph = engine
        .registry()
        .create_subgraph(Some(&agent()), &WorkspaceId::from(WORKSPACE), definition)
        .await
        .unwrap();
    (store, engine, subgraph)
}

fn agent() -> AgentId {
    AgentId::from("agent-tasks")
}

fn id_params() -> Params {
    let mut params = Params::new();
    params.insert("id".to_string(), json!("task-1"));
    params
}

fn task_record(id: &str) -> Record {
    let mut record = Record::new();
    record.insert("t".to_string(), json!({ "id": id }));
    record
}

#[tokio::test]
async fn test_task_subgraph_scenario() {
    let (store, engine, _) = setup(task_definition(IsolationLevel::Strict)).await;

    engine
        .execute_within_subgraph(&agent(), "createTask", "CREATE (t:Task {id: $id})", id_params())
        .await
        .unwrap();

    let err = engine
        .execute_within_subgraph(
            &agent(),
            "listBlocked",
            "MATCH (t:Task)-[:BLOCKS]->(o:Task) RETURN t",
            Params::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BoundaryError::Unauthorized(AuthorizationError::UnauthorizedRelationshipAccess { ref types })
            if types == &vec!["BLOCKS".to_string()]
    ));

    let err = engine
        .execute_within_subgraph(&agent(), "deleteTask", "DELETE (t:Task {id:$id})", id_params())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BoundaryError::Unauthorized(AuthorizationError::OperationNotPermitted {
            operation: CrudOperation::Delete
        })
    ));

    // Only the permitted query reached the store.
    let executed = store.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].query, "CREATE (t:Task {id: $id})");

    let outcomes: Vec<_> = store.access_records().iter().map(|a| a.success).collect();
    assert_eq!(outcomes, vec![true, false, false]);
}

#[tokio::test]
async fn test_disallowed_operations_never_touch_the_store() {
    let (store, engine, _) = setup(task_definition(IsolationLevel::Strict)).await;

    for query in [
        "MATCH (t:Task {id: $id}) SET t.done = true",
        "MATCH (t:Task {id: $id}) DETACH DELETE t",
        "MERGE (t:Task {id: $id})",
        "MATCH (t:Task) REMOVE t.flag",
    ] {
        let err = engine
            .execute_within_subgraph(&agent(), "mutate", query, id_params())
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                BoundaryError::Unauthorized(AuthorizationError::OperationNotPermitted { .. })
            ),
            "{query} should be rejected by CRUD permissions"
        );
    }

    assert!(store.executed().is_empty());
    assert_eq!(store.access_records().len(), 4);
}

#[tokio::test]
async fn test_unauthorized_node_types_are_listed() {
    let (store, engine, _) = setup(task_definition(IsolationLevel::Strict)).await;

    let err = engine
        .execute_within_subgraph(
            &agent(),
            "peek",
            "MATCH (t:Task), (p:Persona), (c:Campaign), (q:Persona) RETURN p",
            Params::new(),
        )
        .await
        .unwrap_err();

    match err {
        BoundaryError::Unauthorized(AuthorizationError::UnauthorizedNodeAccess { types }) => {
            assert_eq!(types, vec!["Persona", "Campaign"]);
        }
        other => panic!("unexpected error: {other}"),
    }

    let audit = store.access_records();
    assert_eq!(audit.len(), 1);
    assert_eq!(
        audit[0].violated_constraints,
        vec!["node_type:Persona", "node_type:Campaign"]
    );
    assert_eq!(audit[0].node_types, vec!["Task", "Persona", "Campaign", "Persona"]);
}

#[tokio::test]
async fn test_relationship_checks_only_under_strict() {
    let query = "MATCH (t:Task)-[:BLOCKS]->(o:Task) RETURN t";

    for isolation in [IsolationLevel::Permissive, IsolationLevel::Shared] {
        let (store, engine, _) = setup(task_definition(isolation)).await;
        engine
            .execute_within_subgraph(&agent(), "listBlocked", query, Params::new())
            .await
            .unwrap();
        assert_eq!(store.executed().len(), 1);
    }
}

#[tokio::test]
async fn test_each_outcome_is_audited_exactly_once() {
    let (store, engine, subgraph) = setup(task_definition(IsolationLevel::Strict)).await;
    store.fail_on("t.broken", "constraint validation failed");

    engine
        .execute_within_subgraph(&agent(), "listTasks", "MATCH (t:Task) RETURN t", Params::new())
        .await
        .unwrap();
    assert_eq!(store.access_records().len(), 1);

    engine
        .execute_within_subgraph(&agent(), "delete", "MATCH (t:Task) DELETE t", Params::new())
        .await
        .unwrap_err();
    assert_eq!(store.access_records().len(), 2);

    let err = engine
        .execute_within_subgraph(
            &agent(),
            "broken",
            "MATCH (t:Task) WHERE t.broken RETURN t",
            Params::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BoundaryError::StoreExecution(_)));

    let audit = store.access_records();
    assert_eq!(audit.len(), 3);
    let last = &audit[2];
    assert!(!last.success);
    assert_eq!(last.violated_constraints, vec![err.to_string()]);
    assert_eq!(last.operation, "broken");
    assert_eq!(last.operation_kind, CrudOperation::Read);
    assert_eq!(last.subgraph_id, subgraph.id);

    assert!(audit.iter().all(|a| a.verify_integrity()));
    assert!(audit[0].violated_constraints.is_empty());
}

#[tokio::test]
async fn test_constraints_are_conjoined_with_existing_filter() {
    let (store, engine, _) = setup(task_definition(IsolationLevel::Strict)).await;

    engine
        .execute_within_subgraph(
            &agent(),
            "openTasks",
            "MATCH (t:Task) WHERE t.status = $status RETURN t",
            Params::new(),
        )
        .await
        .unwrap();
    engine
        .execute_within_subgraph(&agent(), "allTasks", "MATCH (t:Task) RETURN t", Params::new())
        .await
        .unwrap();

    let executed = store.executed();
    assert_eq!(
        executed[0].query,
        "MATCH (t:Task) WHERE (t.workspaceId = $workspaceId) AND (t.status = $status) RETURN t"
    );
    assert_eq!(
        executed[1].query,
        "MATCH (t:Task) WHERE t.workspaceId = $workspaceId RETURN t"
    );
}

#[tokio::test]
async fn test_disjunctive_filter_cannot_escape_the_workspace() {
    let (store, engine, _) = setup(task_definition(IsolationLevel::Strict)).await;

    engine
        .execute_within_subgraph(
            &agent(),
            "anyTask",
            "MATCH (t:Task) WHERE t.a = 1 OR t.b = 2 RETURN t",
            Params::new(),
        )
        .await
        .unwrap();

    assert_eq!(
        store.executed()[0].query,
        "MATCH (t:Task) WHERE (t.workspaceId = $workspaceId) AND (t.a = 1 OR t.b = 2) RETURN t"
    );
}

fn crud_definition() -> SubgraphDefinition {
    SubgraphDefinition {
        crud_permissions: Some(BTreeSet::from([
            CrudOperation::Create,
            CrudOperation::Read,
            CrudOperation::Update,
            CrudOperation::Delete,
        ])),
        ..task_definition(IsolationLevel::Permissive)
    }
}

#[tokio::test]
async fn test_writes_without_projection_are_filtered() {
    let (store, engine, _) = setup(crud_definition()).await;

    engine
        .execute_within_subgraph(
            &agent(),
            "completeTask",
            "MATCH (t:Task {id: $id}) SET t.done = true",
            id_params(),
        )
        .await
        .unwrap();

    assert_eq!(
        store.executed()[0].query,
        "MATCH (t:Task {id: $id}) WHERE t.workspaceId = $workspaceId SET t.done = true"
    );
}

#[tokio::test]
async fn test_unconstrainable_queries_are_denied() {
    let (store, engine, _) = setup(crud_definition()).await;

    for query in [
        "MERGE (t:Task {id: $id}) SET t.done = true",
        "DETACH DELETE (t:Task {id: $id})",
        "MATCH (t:Task) RETURN t UNION MATCH (t:Task) RETURN t",
    ] {
        let err = engine
            .execute_within_subgraph(&agent(), "mutate", query, id_params())
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                BoundaryError::Unauthorized(AuthorizationError::UnconstrainedQuery)
            ),
            "{query} should be denied"
        );
    }

    assert!(store.executed().is_empty());
    let audit = store.access_records();
    assert_eq!(audit.len(), 3);
    for record in &audit {
        assert!(!record.success);
        assert_eq!(record.violated_constraints, vec!["boundary_constraints:unanchored"]);
    }
}

#[tokio::test]
async fn test_every_label_in_an_expression_is_checked() {
    let definition = SubgraphDefinition {
        read_only_node_types: Some(BTreeSet::from(["Product".to_string()])),
        boundary_constraints: Some(vec![]),
        ..task_definition(IsolationLevel::Strict)
    };
    let (store, engine, _) = setup(definition).await;

    let err = engine
        .execute_within_subgraph(
            &agent(),
            "tagTask",
            "CREATE (t:Task:Persona {id: $id})",
            id_params(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BoundaryError::Unauthorized(AuthorizationError::UnauthorizedNodeAccess { ref types })
            if types == &vec!["Persona".to_string()]
    ));

    let err = engine
        .execute_within_subgraph(
            &agent(),
            "fakeProduct",
            "CREATE (t:Task:Product {id: $id})",
            id_params(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BoundaryError::Unauthorized(AuthorizationError::ReadOnlyNodeMutation { ref types })
            if types == &vec!["Product".to_string()]
    ));

    let err = engine
        .execute_within_subgraph(
            &agent(),
            "walk",
            "MATCH (t:Task)-[:HAS_SUBTASK|BLOCKS]->(o:Task) RETURN o",
            Params::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BoundaryError::Unauthorized(AuthorizationError::UnauthorizedRelationshipAccess { ref types })
            if types == &vec!["BLOCKS".to_string()]
    ));

    assert!(store.executed().is_empty());
    assert_eq!(store.access_records().len(), 3);
}

#[tokio::test]
async fn test_boundary_parameters_cannot_be_spoofed() {
    let (store, engine, subgraph) = setup(task_definition(IsolationLevel::Strict)).await;

    let mut params = id_params();
    params.insert("workspaceId".to_string(), json!("ws-other-tenant"));
    engine
        .execute_within_subgraph(&agent(), "listTasks", "MATCH (t:Task) RETURN t", params)
        .await
        .unwrap();

    let executed = store.executed();
    let params = &executed[0].params;
    assert_eq!(params["workspaceId"], json!(WORKSPACE));
    assert_eq!(params["subgraphId"], json!(subgraph.id.to_string()));
    assert_eq!(params["agentId"], json!("agent-tasks"));
    assert_eq!(params["id"], json!("task-1"));
}

#[tokio::test]
async fn test_failing_rule_does_not_change_result() {
    let (store, engine, subgraph) = setup(task_definition(IsolationLevel::Strict)).await;
    store.respond_to("RETURN t", vec![task_record("task-1"), task_record("task-2")]);
    store.fail_on("x.exploding", "condition blew up");

    engine
        .registry()
        .add_inference_rule(
            &subgraph.id,
            "explodes",
            "MATCH (x:Task) WHERE x.exploding RETURN x.id",
            "CREATE (t:Task {derived: true})",
            RuleOptions::default(),
        )
        .await
        .unwrap();

    let records = engine
        .execute_within_subgraph(&agent(), "listTasks", "MATCH (t:Task) RETURN t", Params::new())
        .await
        .unwrap();

    assert_eq!(records, vec![task_record("task-1"), task_record("task-2")]);
    let audit = store.access_records();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].success);

    // The action never ran.
    assert!(store
        .executed()
        .iter()
        .all(|q| !q.query.contains("derived")));
}

#[tokio::test]
async fn test_read_only_types_can_be_linked_but_not_mutated() {
    let definition = SubgraphDefinition {
        read_only_node_types: Some(BTreeSet::from(["Product".to_string()])),
        crud_permissions: Some(BTreeSet::from([
            CrudOperation::Create,
            CrudOperation::Read,
            CrudOperation::Update,
            CrudOperation::Delete,
        ])),
        boundary_constraints: Some(vec![]),
        ..task_definition(IsolationLevel::Permissive)
    };
    let (store, engine, _) = setup(definition).await;

    engine
        .execute_within_subgraph(
            &agent(),
            "linkTask",
            "MATCH (p:Product {id: $pid}) CREATE (t:Task {id: $id})-[:FOR]->(p)",
            id_params(),
        )
        .await
        .unwrap();

    let err = engine
        .execute_within_subgraph(
            &agent(),
            "renameProduct",
            "MATCH (p:Product {id: $pid}) SET p.name = $name",
            Params::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BoundaryError::Unauthorized(AuthorizationError::ReadOnlyNodeMutation { ref types })
            if types == &vec!["Product".to_string()]
    ));

    assert_eq!(store.executed().len(), 1);
    let audit = store.access_records();
    assert_eq!(audit[1].violated_constraints, vec!["read_only_node_type:Product"]);
}

#[tokio::test]
async fn test_unknown_agent_is_not_audited() {
    let (store, engine, _) = setup(task_definition(IsolationLevel::Strict)).await;

    let err = engine
        .execute_within_subgraph(
            &AgentId::from("stranger"),
            "listTasks",
            "MATCH (t:Task) RETURN t",
            Params::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BoundaryError::NotFound { .. }));
    assert!(store.access_records().is_empty());
    assert!(store.executed().is_empty());
}

#[tokio::test]
async fn test_audit_failure_is_fatal() {
    let (store, engine, _) = setup(task_definition(IsolationLevel::Strict)).await;
    store.fail_access_writes(true);

    let err = engine
        .execute_within_subgraph(&agent(), "listTasks", "MATCH (t:Task) RETURN t", Params::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BoundaryError::AuditWrite(_)));

    // A violation whose audit cannot be written surfaces the audit failure.
    let err = engine
        .execute_within_subgraph(&agent(), "delete", "MATCH (t:Task) DELETE t", Params::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BoundaryError::AuditWrite(_)));
}

#[tokio::test]
async fn test_rules_can_be_disabled_by_configuration() {
    let (store, engine, subgraph) = setup(task_definition(IsolationLevel::Strict)).await;
    engine
        .registry()
        .add_inference_rule(
            &subgraph.id,
            "always",
            "",
            "CREATE (t:Task {derived: true})",
            RuleOptions::default(),
        )
        .await
        .unwrap();

    let engine = engine.with_rules_enabled(false);
    engine
        .execute_within_subgraph(&agent(), "listTasks", "MATCH (t:Task) RETURN t", Params::new())
        .await
        .unwrap();
    assert_eq!(store.executed().len(), 1);

    let engine = engine.with_rules_enabled(true);
    engine
        .execute_within_subgraph(&agent(), "listTasks", "MATCH (t:Task) RETURN t", Params::new())
        .await
        .unwrap();
    let executed = store.executed();
    assert_eq!(executed.len(), 3);
    assert_eq!(executed[2].query, "CREATE (t:Task {derived: true})");
}
