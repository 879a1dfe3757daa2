mod common;

use common::{column, view_event, Harness};

use lineage_core::qualified_name;
use lineage_core::{EntityGuid, RepositoryError, TypeCatalog};
use lineage_sync_lib::audit::{AuditCode, AuditQuery};
use lineage_sync_lib::engine::DispatchOutcome;

const LINEAGE_TYPES: [&str; 7] = [
    "SoftwareServer",
    "Endpoint",
    "Connection",
    "ConnectorType",
    "Database",
    "InformationView",
    "RelationalDBSchemaType",
];

fn lineage_guids(harness: &Harness) -> Vec<EntityGuid> {
    LINEAGE_TYPES
        .iter()
        .map(|type_name| harness.only(type_name).guid)
        .collect()
}

#[tokio::test]
async fn test_new_view_builds_full_lineage() {
    let harness = Harness::new();
    harness.seed_source_column("C1");

    let outcome = harness
        .service
        .dispatch(&view_event(vec![column("total", 0, Some("C1"))]))
        .await;

    let table = harness.only("RelationalTable");
    assert_eq!(
        outcome,
        DispatchOutcome::Reconciled {
            root: table.guid.clone(),
            partial: false,
            failed_columns: Vec::new(),
        }
    );

    let catalog = TypeCatalog::default();
    assert_eq!(
        harness.only("SoftwareServer").qualified_name,
        "(SoftwareServer)=db.example.com"
    );
    let view = harness.only("InformationView");
    assert_eq!(
        view.qualified_name,
        qualified_name::information_view(&catalog, "db.example.com", "shop", "sales")
    );
    assert!(table.qualified_name.starts_with(&view.qualified_name));
    assert!(table.qualified_name.ends_with("(RelationalTable)=orders"));

    assert_eq!(harness.column_names(), vec!["total".to_string()]);
    let total = harness.only("DerivedRelationalColumn");
    let lineage = harness.repository.relationships_of_type("SchemaQueryImplementation");
    assert_eq!(lineage.len(), 1);
    assert!(lineage[0].connects(&total.guid, &EntityGuid::from("C1")));

    let connector = harness.repository.relationships_of_type("ConnectionConnectorType");
    assert_eq!(connector.len(), 1, "provider was reported, connector type must be linked");
}

#[tokio::test]
async fn test_rerun_with_changed_columns_reuses_upstream_nodes() {
    let harness = Harness::new();
    harness.seed_source_column("C1");
    harness.seed_source_column("C2");

    harness
        .service
        .dispatch(&view_event(vec![column("total", 0, Some("C1"))]))
        .await;
    let before = lineage_guids(&harness);
    let table_before = harness.only("RelationalTable").guid;

    let outcome = harness
        .service
        .dispatch(&view_event(vec![column("tax", 0, Some("C2"))]))
        .await;

    assert!(matches!(outcome, DispatchOutcome::Reconciled { partial: false, .. }));
    assert_eq!(lineage_guids(&harness), before, "upstream nodes must be reused");
    assert_eq!(harness.only("RelationalTable").guid, table_before);
    assert_eq!(harness.column_names(), vec!["tax".to_string()]);

    // The stale column takes its type node with it
    assert_eq!(harness.repository.entities_of_type("RelationalColumnType").len(), 1);
    let lineage = harness.repository.relationships_of_type("SchemaQueryImplementation");
    assert_eq!(lineage.len(), 1);
    assert_eq!(lineage[0].to, EntityGuid::from("C2"));
}

#[tokio::test]
async fn test_same_event_twice_is_idempotent() {
    let harness = Harness::new();
    harness.seed_source_column("C1");
    harness.seed_term("T1");

    let mut first = column("total", 0, Some("C1"));
    first["businessTerms"] = serde_json::json!([{ "guid": "T1" }]);
    let payload = view_event(vec![first, column("tax", 1, None)]);

    harness.service.dispatch(&payload).await;
    let entities = harness.repository.entity_count();
    let relationships = harness.repository.relationship_count();
    let stats = harness.repository.stats();

    let outcome = harness.service.dispatch(&payload).await;
    assert!(matches!(outcome, DispatchOutcome::Reconciled { partial: false, .. }));
    assert_eq!(harness.repository.entity_count(), entities);
    assert_eq!(harness.repository.relationship_count(), relationships);

    let after = harness.repository.stats();
    assert_eq!(after.creates, stats.creates, "second run must not create entities");
    assert_eq!(after.updates, stats.updates, "second run must not update entities");
    assert_eq!(after.relationships_created, stats.relationships_created);
    assert_eq!(after.deletes, stats.deletes);
    assert_eq!(harness.repository.relationships_of_type("SemanticAssignment").len(), 1);
}

#[tokio::test]
async fn test_column_set_converges_to_latest_event() {
    let harness = Harness::new();

    harness
        .service
        .dispatch(&view_event(vec![
            column("a", 0, None),
            column("b", 1, None),
            column("c", 2, None),
        ]))
        .await;
    assert_eq!(harness.column_names(), vec!["a", "b", "c"]);

    harness
        .service
        .dispatch(&view_event(vec![
            column("b", 0, None),
            column("c", 1, None),
            column("d", 2, None),
        ]))
        .await;
    assert_eq!(harness.column_names(), vec!["b", "c", "d"]);
    assert_eq!(harness.repository.entities_of_type("DerivedRelationalColumn").len(), 3);
}

#[tokio::test]
async fn test_empty_column_list_retracts_table() {
    let harness = Harness::new();
    harness
        .service
        .dispatch(&view_event(vec![column("a", 0, None), column("b", 1, None)]))
        .await;

    let outcome = harness.service.dispatch(&view_event(vec![])).await;
    assert_eq!(outcome, DispatchOutcome::Retracted { deleted_columns: 2 });

    for type_name in [
        "RelationalTable",
        "RelationalTableType",
        "DerivedRelationalColumn",
        "RelationalColumnType",
    ] {
        assert!(
            harness.repository.entities_of_type(type_name).is_empty(),
            "{} should have been removed",
            type_name
        );
    }
    // Lineage above the table stays for other tables of the schema
    assert_eq!(lineage_guids(&harness).len(), LINEAGE_TYPES.len());

    let again = harness.service.dispatch(&view_event(vec![])).await;
    assert_eq!(again, DispatchOutcome::Retracted { deleted_columns: 0 });
}

#[tokio::test]
async fn test_failed_column_does_not_block_siblings() {
    let harness = Harness::new();
    harness
        .service
        .dispatch(&view_event(vec![column("a", 0, None), column("b", 1, None)]))
        .await;

    let b_guid = harness
        .repository
        .entities_of_type("DerivedRelationalColumn")
        .into_iter()
        .find(|e| e.qualified_name.ends_with("=b"))
        .map(|e| e.guid)
        .unwrap();

    // Column b now points at an upstream column that does not exist
    let outcome = harness
        .service
        .dispatch(&view_event(vec![
            column("a", 0, None),
            column("b", 1, Some("missing")),
            column("c", 2, None),
        ]))
        .await;

    let DispatchOutcome::Reconciled {
        partial,
        failed_columns,
        ..
    } = &outcome
    else {
        panic!("expected a reconciled outcome, got {:?}", outcome);
    };
    assert!(*partial);
    assert_eq!(failed_columns, &vec!["b".to_string()]);
    assert_eq!(harness.column_names(), vec!["a", "b", "c"]);
    assert!(
        harness.repository.entity(&b_guid).is_some(),
        "a column that failed to reconcile must not be deleted as stale"
    );

    let partial = harness.service.audit.get_entries(&AuditQuery {
        code: Some(AuditCode::PartialColumnFailure),
        ..AuditQuery::default()
    });
    assert_eq!(partial.len(), 1);
    assert!(
        partial[0].message.starts_with("Columns b of table"),
        "unexpected message: {}",
        partial[0].message
    );
    assert!(error_mentions(&partial[0].cause, "missing"));
}

fn error_mentions(cause: &Option<String>, needle: &str) -> bool {
    cause.as_deref().map_or(false, |c| c.contains(needle))
}

#[tokio::test]
async fn test_failed_table_creation_reports_step() {
    let harness = Harness::new();
    let catalog = TypeCatalog::default();
    let view = qualified_name::information_view(&catalog, "db.example.com", "shop", "sales");
    let names = qualified_name::TableNames::new(&catalog, &view, "orders");
    harness
        .repository
        .fail_create_of(names.table.clone(), RepositoryError::unauthorized("read only"));

    let outcome = harness
        .service
        .dispatch(&view_event(vec![column("a", 0, None)]))
        .await;

    let DispatchOutcome::Failed { error } = &outcome else {
        panic!("expected a failed outcome, got {:?}", outcome);
    };
    assert!(error.contains("read only"), "unexpected error: {}", error);
    assert!(harness.repository.entities_of_type("RelationalTable").is_empty());
    assert!(harness.repository.entities_of_type("DerivedRelationalColumn").is_empty());
}

#[tokio::test]
async fn test_qualified_names_are_deterministic() {
    let first = Harness::new();
    let second = Harness::new();
    let payload = view_event(vec![column("a", 0, None), column("b", 1, None)]);

    first.service.dispatch(&payload).await;
    second.service.dispatch(&payload).await;

    let names = |harness: &Harness| {
        let mut names: Vec<String> = harness
            .repository
            .snapshot()
            .entities
            .into_iter()
            .map(|e| e.qualified_name)
            .collect();
        names.sort();
        names
    };
    assert_eq!(names(&first), names(&second));
}

#[tokio::test]
async fn test_new_column_whose_create_fails_is_reported() {
    let harness = Harness::new();
    let catalog = TypeCatalog::default();
    let view = qualified_name::information_view(&catalog, "db.example.com", "shop", "sales");
    let names = qualified_name::TableNames::new(&catalog, &view, "orders");
    harness.repository.fail_create_of(
        names.column(&catalog, "b"),
        RepositoryError::validation("column rejected"),
    );

    let outcome = harness
        .service
        .dispatch(&view_event(vec![
            column("a", 0, None),
            column("b", 1, None),
            column("c", 2, None),
        ]))
        .await;

    let DispatchOutcome::Reconciled {
        partial,
        failed_columns,
        ..
    } = &outcome
    else {
        panic!("expected a reconciled outcome, got {:?}", outcome);
    };
    assert!(*partial);
    assert_eq!(failed_columns, &vec!["b".to_string()]);
    assert_eq!(harness.column_names(), vec!["a", "c"]);
    assert!(harness
        .repository
        .entities_of_type("DerivedRelationalColumn")
        .iter()
        .all(|e| e.qualified_name != names.column(&catalog, "b")));
}

#[tokio::test]
async fn test_transient_column_failure_retries_the_event() {
    let harness = Harness::with_attempts(3);
    let catalog = TypeCatalog::default();
    let view = qualified_name::information_view(&catalog, "db.example.com", "shop", "sales");
    let names = qualified_name::TableNames::new(&catalog, &view, "orders");
    harness.repository.fail_create_of_times(
        names.column(&catalog, "b"),
        1,
        RepositoryError::Timeout { timeout_ms: 5 },
    );

    let outcome = harness
        .service
        .dispatch(&view_event(vec![
            column("a", 0, None),
            column("b", 1, None),
            column("c", 2, None),
        ]))
        .await;

    assert!(
        matches!(outcome, DispatchOutcome::Reconciled { partial: false, .. }),
        "unexpected outcome {:?}",
        outcome
    );
    assert_eq!(harness.column_names(), vec!["a", "b", "c"]);
    assert!(harness
        .service
        .audit
        .get_entries(&AuditQuery {
            code: Some(AuditCode::PartialColumnFailure),
            ..AuditQuery::default()
        })
        .is_empty());
}

#[tokio::test]
async fn test_persistent_transient_column_failure_exhausts_retries() {
    let harness = Harness::with_attempts(2);
    let catalog = TypeCatalog::default();
    let view = qualified_name::information_view(&catalog, "db.example.com", "shop", "sales");
    let names = qualified_name::TableNames::new(&catalog, &view, "orders");
    harness.repository.fail_create_of(
        names.column(&catalog, "b"),
        RepositoryError::connection_failed("store unavailable"),
    );

    let outcome = harness
        .service
        .dispatch(&view_event(vec![column("a", 0, None), column("b", 1, None)]))
        .await;

    assert!(matches!(outcome, DispatchOutcome::Failed { .. }));
    assert_eq!(harness.column_names(), vec!["a"]);
    let exhausted = harness.service.audit.get_entries(&AuditQuery {
        code: Some(AuditCode::RetriesExhausted),
        ..AuditQuery::default()
    });
    assert_eq!(exhausted.len(), 1);
}
