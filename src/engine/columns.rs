// SPDX-License-Identifier: Apache-2.0

//! Derived column reconciliation
//!
//! Brings the columns attached to a table's type node in line with the
//! latest report:
//! - Parallel upsert of every reported column and its edges
//! - Per-column failure isolation
//! - Set-difference removal of columns no longer reported
//! - Retraction of the whole table when no column is reported

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use lineage_core::qualified_name::{self, type_discriminator, TableNames};
use lineage_core::types::keys;
use lineage_core::{
    EntityGuid, EntityKind, GraphRelationship, PropertiesBuilder, RelationshipKind,
    RepositoryError, RepositoryResult,
};

use super::events::{DerivedColumn, TableSource};
use super::lineage::schema_type_properties;
use super::resolver::{EntityRef, EntityResolver};
use crate::audit::{AuditCode, AuditRecord, AuditSink};
use crate::config::StaleColumnPolicy;
use crate::error::{ReconcileStep, StepContext, SyncError, SyncResult};
use crate::metrics;

/// A reported column that could not be reconciled
#[derive(Debug, Clone, Serialize)]
pub struct ColumnFailure {
    pub column: String,
    pub error: RepositoryError,
}

/// A stale column that is still in the store
#[derive(Debug, Clone, Serialize)]
pub struct StaleDeleteFailure {
    pub guid: EntityGuid,
    pub error: RepositoryError,
}

/// Result of reconciling one table
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub table: EntityRef,
    pub table_type: EntityRef,
    /// Reconciled columns, in reported order
    pub columns: Vec<EntityRef>,
    pub failed_columns: Vec<ColumnFailure>,
    pub deleted_columns: Vec<EntityGuid>,
    pub stale_delete_failures: Vec<StaleDeleteFailure>,
}

impl ReconcileOutcome {
    /// True if the stored column set does not exactly match the report
    pub fn is_partial(&self) -> bool {
        !self.failed_columns.is_empty() || !self.stale_delete_failures.is_empty()
    }
}

/// Result of retracting a table
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetractOutcome {
    pub table: Option<EntityGuid>,
    pub table_type: Option<EntityGuid>,
    pub deleted_columns: Vec<EntityGuid>,
}

impl RetractOutcome {
    /// True if nothing existed to retract
    pub fn is_noop(&self) -> bool {
        self.table.is_none() && self.table_type.is_none() && self.deleted_columns.is_empty()
    }
}

pub struct DerivedColumnReconciler {
    resolver: Arc<EntityResolver>,
    audit: Arc<dyn AuditSink>,
    concurrency: usize,
    stale_policy: StaleColumnPolicy,
}

impl DerivedColumnReconciler {
    pub fn new(
        resolver: Arc<EntityResolver>,
        audit: Arc<dyn AuditSink>,
        concurrency: usize,
        stale_policy: StaleColumnPolicy,
    ) -> Self {
        Self {
            resolver,
            audit,
            concurrency: concurrency.max(1),
            stale_policy,
        }
    }

    fn table_names(&self, table: &TableSource) -> TableNames {
        let catalog = self.resolver.catalog();
        let container = qualified_name::information_view(
            catalog,
            table.host(),
            &table.database_source.name,
            &table.schema_name,
        );
        TableNames::new(catalog, &container, &table.name)
    }

    /// Reconciles a table's columns against `columns`
    ///
    /// `schema_type` is the schema type node the table hangs off. An empty
    /// column list is rejected; use [`Self::retract_view`] instead.
    #[instrument(
        skip(self, table, schema_type, columns),
        fields(table = %table.name, schema = %table.schema_name, columns = columns.len())
    )]
    pub async fn reconcile(
        &self,
        table: &TableSource,
        schema_type: &EntityRef,
        columns: &[DerivedColumn],
    ) -> SyncResult<ReconcileOutcome> {
        if columns.is_empty() {
            return Err(SyncError::validation(format!(
                "table {} reports no columns",
                table.name
            )));
        }

        let names = self.table_names(table);

        let table_type_name = type_discriminator(&table.name);
        let table_type = self
            .resolver
            .upsert(
                EntityKind::RelationalTableType,
                &names.table_type,
                schema_type_properties(&table_type_name),
                None,
            )
            .await
            .step(ReconcileStep::TableType)?;

        let mut table_props = PropertiesBuilder::new().with_string(keys::NAME, table.name.as_str());
        if let Some(display_name) = table.display_name() {
            table_props = table_props.with_map(
                keys::ADDITIONAL_PROPERTIES,
                [(keys::DISPLAY_NAME.to_string(), display_name.to_string())]
                    .into_iter()
                    .collect(),
            );
        }
        let table_ref = self
            .resolver
            .upsert(EntityKind::RelationalTable, &names.table, table_props.build(), None)
            .await
            .step(ReconcileStep::Table)?;

        self.resolver
            .ensure_relationship(
                RelationshipKind::AttributeForSchema,
                &schema_type.guid,
                &table_ref.guid,
            )
            .await
            .step(ReconcileStep::Relationship)?;
        self.resolver
            .ensure_relationship(
                RelationshipKind::SchemaAttributeType,
                &table_ref.guid,
                &table_type.guid,
            )
            .await
            .step(ReconcileStep::Relationship)?;

        // A freshly created type node has no columns yet
        let before = if table_type.created {
            Vec::new()
        } else {
            self.column_edges(&table_type.guid)
                .await
                .step(ReconcileStep::ListColumns)?
        };

        let names_ref = &names;
        let table_type_ref = &table_type;
        let mut results: Vec<(usize, &DerivedColumn, RepositoryResult<EntityRef>)> =
            stream::iter(columns.iter().enumerate())
                .map(|(index, column)| async move {
                    let result = self.reconcile_column(names_ref, table_type_ref, column).await;
                    (index, column, result)
                })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
        results.sort_by_key(|(index, _, _)| *index);

        let mut reconciled = Vec::with_capacity(columns.len());
        let mut failed_columns = Vec::new();
        let mut keep: HashSet<EntityGuid> = HashSet::new();
        let mut protect_all = false;

        for (_, column, result) in results {
            match result {
                Ok(column_ref) => {
                    keep.insert(column_ref.guid.clone());
                    reconciled.push(column_ref);
                }
                Err(error) => {
                    warn!(column = %column.name, error = %error, "Failed to reconcile column");
                    // Keep an existing column out of the stale set even though it failed
                    let column_qn = names.column(self.resolver.catalog(), &column.name);
                    match self
                        .resolver
                        .find(EntityKind::DerivedRelationalColumn, &column_qn)
                        .await
                    {
                        Ok(Some(existing)) => {
                            keep.insert(existing.guid);
                        }
                        Ok(None) => {}
                        Err(lookup_error) => {
                            warn!(
                                column = %column.name,
                                error = %lookup_error,
                                "Cannot tell whether failed column exists, skipping stale cleanup"
                            );
                            protect_all = true;
                        }
                    }
                    failed_columns.push(ColumnFailure {
                        column: column.name.clone(),
                        error,
                    });
                }
            }
        }

        let mut seen = HashSet::new();
        let stale: Vec<GraphRelationship> = if protect_all {
            Vec::new()
        } else {
            before
                .into_iter()
                .filter(|rel| !keep.contains(&rel.to))
                .filter(|rel| seen.insert(rel.to.clone()))
                .collect()
        };

        let mut deleted_columns = Vec::new();
        let mut stale_delete_failures = Vec::new();
        for rel in stale {
            match self.delete_column(&rel.to, &rel.to_type_name).await {
                Ok(()) => {
                    debug!(guid = %rel.to, "Deleted stale column");
                    deleted_columns.push(rel.to);
                }
                Err(error) => {
                    self.report_stale_failure(table, &rel.to, &error);
                    stale_delete_failures.push(StaleDeleteFailure { guid: rel.to, error });
                }
            }
        }

        metrics::record_columns(reconciled.len(), failed_columns.len());
        metrics::record_stale(deleted_columns.len(), stale_delete_failures.len());

        // A transient column failure fails the table so the whole event is retried
        if let Some(transient) = failed_columns.iter().find(|f| f.error.is_retryable()) {
            warn!(
                column = %transient.column,
                error = %transient.error,
                "Transient column failure"
            );
            return Err(SyncError::at(ReconcileStep::Columns, transient.error.clone()));
        }

        if !failed_columns.is_empty() {
            let failed: Vec<&str> = failed_columns.iter().map(|f| f.column.as_str()).collect();
            let causes: Vec<String> = failed_columns
                .iter()
                .map(|f| format!("{}: {}", f.column, f.error))
                .collect();
            self.audit.record(
                AuditRecord::new(
                    AuditCode::PartialColumnFailure,
                    super::events::NEW_VIEW_EVENT,
                    &[&names.table, &failed.join(", ")],
                )
                .with_cause(causes.join("; ")),
            );
        }

        info!(
            reconciled = reconciled.len(),
            failed = failed_columns.len(),
            deleted = deleted_columns.len(),
            "Reconciled table columns"
        );

        Ok(ReconcileOutcome {
            table: table_ref,
            table_type,
            columns: reconciled,
            failed_columns,
            deleted_columns,
            stale_delete_failures,
        })
    }

    /// Upserts one column, its type node and its edges
    #[instrument(skip(self, names, table_type, column), fields(column = %column.name))]
    async fn reconcile_column(
        &self,
        names: &TableNames,
        table_type: &EntityRef,
        column: &DerivedColumn,
    ) -> RepositoryResult<EntityRef> {
        let catalog = self.resolver.catalog();

        let mut column_type_props = schema_type_properties(&type_discriminator(&column.name));
        column_type_props.insert(
            keys::DATA_TYPE.to_string(),
            lineage_core::PropertyValue::String(column.data_type.clone()),
        );
        let column_type = self
            .resolver
            .upsert(
                EntityKind::RelationalColumnType,
                &names.column_type(catalog, &column.name),
                column_type_props,
                None,
            )
            .await?;

        let column_ref = self
            .resolver
            .upsert(
                EntityKind::DerivedRelationalColumn,
                &names.column(catalog, &column.name),
                PropertiesBuilder::new()
                    .with_string(keys::NAME, column.name.as_str())
                    .with_string(keys::FORMULA, column.formula.clone().unwrap_or_default())
                    .with_int(keys::POSITION, column.position)
                    .build(),
                None,
            )
            .await?;

        self.resolver
            .ensure_relationship(
                RelationshipKind::AttributeForSchema,
                &table_type.guid,
                &column_ref.guid,
            )
            .await?;

        if let Some(source) = column.source_guid() {
            self.resolver
                .ensure_relationship(
                    RelationshipKind::SchemaQueryImplementation,
                    &column_ref.guid,
                    &EntityGuid::from(source),
                )
                .await?;
        }

        self.resolver
            .ensure_relationship(
                RelationshipKind::SchemaAttributeType,
                &column_ref.guid,
                &column_type.guid,
            )
            .await?;

        for term in column.terms() {
            self.resolver
                .ensure_relationship(
                    RelationshipKind::SemanticAssignment,
                    &column_ref.guid,
                    &EntityGuid::from(term.guid.as_str()),
                )
                .await?;
        }

        Ok(column_ref)
    }

    /// Column edges leaving a table type node
    async fn column_edges(&self, table_type: &EntityGuid) -> RepositoryResult<Vec<GraphRelationship>> {
        let relationship = self
            .resolver
            .catalog()
            .relationship_name(RelationshipKind::AttributeForSchema);
        let edges = self
            .resolver
            .repository()
            .list_relationships_by_type(table_type, relationship)
            .await?;
        Ok(edges
            .into_iter()
            .filter(|rel| rel.starts_at(table_type))
            .collect())
    }

    /// Deletes a column and then its type nodes
    ///
    /// Type node failures are logged only; the column itself is gone.
    async fn delete_column(&self, column: &EntityGuid, type_name: &str) -> RepositoryResult<()> {
        let repository = self.resolver.repository();
        let relationship = self
            .resolver
            .catalog()
            .relationship_name(RelationshipKind::SchemaAttributeType);
        let type_edges: Vec<GraphRelationship> = repository
            .list_relationships_by_type(column, relationship)
            .await?
            .into_iter()
            .filter(|rel| rel.starts_at(column))
            .collect();

        repository.delete_entity(column, type_name).await?;

        for edge in type_edges {
            let deleted = repository.delete_entity(&edge.to, &edge.to_type_name).await;
            if let Err(e) = ignore_missing(deleted) {
                warn!(guid = %edge.to, error = %e, "Failed to delete column type");
            }
        }
        Ok(())
    }

    fn report_stale_failure(&self, table: &TableSource, column: &EntityGuid, error: &RepositoryError) {
        warn!(
            table = %table.name,
            column = %column,
            error = %error,
            policy = ?self.stale_policy,
            "Failed to delete stale column"
        );
        if self.stale_policy == StaleColumnPolicy::RetryNextRun {
            let error = error.to_string();
            self.audit.record(
                AuditRecord::new(
                    AuditCode::StaleColumnDeleteFailed,
                    super::events::NEW_VIEW_EVENT,
                    &[&table.name, column.as_str(), &error],
                )
                .with_cause(error.clone()),
            );
        }
    }

    /// Deletes the table, its type node and every column below it
    ///
    /// Nodes that do not exist are skipped.
    #[instrument(skip(self, table), fields(table = %table.name, schema = %table.schema_name))]
    pub async fn retract_view(&self, table: &TableSource) -> SyncResult<RetractOutcome> {
        let names = self.table_names(table);
        let mut outcome = RetractOutcome::default();

        let table_type = self
            .resolver
            .find(EntityKind::RelationalTableType, &names.table_type)
            .await
            .step(ReconcileStep::RetractView)?;

        if let Some(table_type) = table_type {
            let edges = self
                .column_edges(&table_type.guid)
                .await
                .step(ReconcileStep::RetractView)?;
            for rel in edges {
                match self.delete_column(&rel.to, &rel.to_type_name).await {
                    Ok(()) => outcome.deleted_columns.push(rel.to),
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(SyncError::at(ReconcileStep::RetractView, e)),
                }
            }

            ignore_missing(
                self.resolver
                    .delete(EntityKind::RelationalTableType, &table_type.guid)
                    .await,
            )
            .step(ReconcileStep::RetractView)?;
            outcome.table_type = Some(table_type.guid);
        }

        let table_entity = self
            .resolver
            .find(EntityKind::RelationalTable, &names.table)
            .await
            .step(ReconcileStep::RetractView)?;
        if let Some(table_entity) = table_entity {
            ignore_missing(
                self.resolver
                    .delete(EntityKind::RelationalTable, &table_entity.guid)
                    .await,
            )
            .step(ReconcileStep::RetractView)?;
            outcome.table = Some(table_entity.guid);
        }

        metrics::record_stale(outcome.deleted_columns.len(), 0);

        if outcome.is_noop() {
            debug!("Nothing to retract");
        } else {
            info!(columns = outcome.deleted_columns.len(), "Retracted view");
        }
        Ok(outcome)
    }
}

fn ignore_missing(result: RepositoryResult<()>) -> RepositoryResult<()> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditQuery, AuditStore};
    use crate::engine::events::{DatabaseSource, EndpointDescriptor, SourceColumn};
    use crate::repository::InMemoryRepository;
    use lineage_core::TypeCatalog;

    struct Fixture {
        repository: Arc<InMemoryRepository>,
        audit: Arc<AuditStore>,
        reconciler: DerivedColumnReconciler,
        schema_type: EntityRef,
    }

    async fn fixture(policy: StaleColumnPolicy) -> Fixture {
        let repository = Arc::new(InMemoryRepository::new());
        let resolver = Arc::new(EntityResolver::new(
            repository.clone(),
            Arc::new(TypeCatalog::default()),
        ));
        let audit = Arc::new(AuditStore::in_memory());
        let reconciler = DerivedColumnReconciler::new(resolver.clone(), audit.clone(), 4, policy);
        let schema_type = resolver
            .upsert(
                EntityKind::RelationalDbSchemaType,
                "(RelationalDBSchemaType)=sales_type",
                Default::default(),
                None,
            )
            .await
            .unwrap();
        Fixture {
            repository,
            audit,
            reconciler,
            schema_type,
        }
    }

    fn table() -> TableSource {
        TableSource {
            name: "orders".to_string(),
            original_name: Some("orders_raw".to_string()),
            schema_name: "sales".to_string(),
            database_source: DatabaseSource {
                name: "shop".to_string(),
                endpoint: EndpointDescriptor {
                    protocol: "tcp://".to_string(),
                    network_address: "db.example.com:5432".to_string(),
                    display_name: None,
                    connector_provider_name: None,
                    user: None,
                    encryption_method: None,
                    password: None,
                },
            },
        }
    }

    fn column(name: &str, position: i64) -> DerivedColumn {
        DerivedColumn {
            name: name.to_string(),
            data_type: "varchar".to_string(),
            position,
            formula: None,
            source_column: None,
            business_terms: Vec::new(),
        }
    }

    fn column_names(repository: &InMemoryRepository, outcome: &ReconcileOutcome) -> Vec<String> {
        let mut names: Vec<String> = repository
            .relationships_of_type("AttributeForSchema")
            .into_iter()
            .filter(|rel| rel.from == outcome.table_type.guid)
            .filter_map(|rel| repository.entity(&rel.to))
            .filter_map(|e| e.properties[keys::NAME].as_str().map(str::to_string))
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_column_set_converges() {
        let f = fixture(StaleColumnPolicy::RetryNextRun).await;
        let table = table();

        let first = f
            .reconciler
            .reconcile(&table, &f.schema_type, &[column("a", 0), column("b", 1), column("c", 2)])
            .await
            .unwrap();
        assert_eq!(column_names(&f.repository, &first), vec!["a", "b", "c"]);

        let second = f
            .reconciler
            .reconcile(&table, &f.schema_type, &[column("b", 0), column("c", 1), column("d", 2)])
            .await
            .unwrap();
        assert_eq!(column_names(&f.repository, &second), vec!["b", "c", "d"]);
        assert_eq!(second.deleted_columns, vec![first.columns[0].guid.clone()]);
        assert_eq!(second.columns[0].guid, first.columns[1].guid);
        assert!(!second.is_partial());

        // The deleted column's type node went with it
        assert_eq!(f.repository.entities_of_type("RelationalColumnType").len(), 3);
        assert_eq!(f.repository.entities_of_type("DerivedRelationalColumn").len(), 3);
    }

    #[tokio::test]
    async fn test_rerun_writes_nothing() {
        let f = fixture(StaleColumnPolicy::RetryNextRun).await;
        let columns = [column("a", 0), column("b", 1)];
        f.reconciler
            .reconcile(&table(), &f.schema_type, &columns)
            .await
            .unwrap();
        let stats = f.repository.stats();

        f.reconciler
            .reconcile(&table(), &f.schema_type, &columns)
            .await
            .unwrap();
        let after = f.repository.stats();
        assert_eq!(after.creates, stats.creates);
        assert_eq!(after.updates, stats.updates);
        assert_eq!(after.relationships_created, stats.relationships_created);
    }

    #[tokio::test]
    async fn test_failed_column_is_isolated_and_protected() {
        let f = fixture(StaleColumnPolicy::RetryNextRun).await;
        let table = table();
        f.reconciler
            .reconcile(&table, &f.schema_type, &[column("a", 0), column("b", 1)])
            .await
            .unwrap();

        // b exists but its source column does not, so b fails this time
        let mut broken = column("b", 1);
        broken.source_column = Some(SourceColumn {
            guid: "missing".to_string(),
            qualified_name: None,
            business_terms: Vec::new(),
        });
        let outcome = f
            .reconciler
            .reconcile(&table, &f.schema_type, &[column("a", 0), broken, column("c", 2)])
            .await
            .unwrap();

        assert!(outcome.is_partial());
        assert_eq!(outcome.failed_columns.len(), 1);
        assert_eq!(outcome.failed_columns[0].column, "b");
        assert!(outcome.deleted_columns.is_empty());
        assert_eq!(column_names(&f.repository, &outcome), vec!["a", "b", "c"]);

        let audited = f.audit.get_entries(&AuditQuery {
            code: Some(AuditCode::PartialColumnFailure),
            ..AuditQuery::default()
        });
        assert_eq!(audited.len(), 1);
        assert!(audited[0].message.contains("b"));
    }

    #[tokio::test]
    async fn test_transient_column_failure_fails_the_table() {
        let f = fixture(StaleColumnPolicy::RetryNextRun).await;
        let table = table();
        let b = f
            .reconciler
            .table_names(&table)
            .column(&TypeCatalog::default(), "b");
        f.repository
            .fail_create_of_times(b, 1, RepositoryError::Timeout { timeout_ms: 5 });

        let err = f
            .reconciler
            .reconcile(&table, &f.schema_type, &[column("a", 0), column("b", 1), column("c", 2)])
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.step(), Some(ReconcileStep::Columns));
        assert!(f
            .audit
            .get_entries(&AuditQuery {
                code: Some(AuditCode::PartialColumnFailure),
                ..AuditQuery::default()
            })
            .is_empty());

        let outcome = f
            .reconciler
            .reconcile(&table, &f.schema_type, &[column("a", 0), column("b", 1), column("c", 2)])
            .await
            .unwrap();
        assert!(!outcome.is_partial());
        assert_eq!(column_names(&f.repository, &outcome), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_stale_delete_failure_is_retried_next_run() {
        let f = fixture(StaleColumnPolicy::RetryNextRun).await;
        let table = table();
        let first = f
            .reconciler
            .reconcile(&table, &f.schema_type, &[column("a", 0), column("b", 1)])
            .await
            .unwrap();
        let a = first.columns[0].guid.clone();

        f.repository
            .fail_delete_of(&a, RepositoryError::connection_failed("flaky"));
        let second = f
            .reconciler
            .reconcile(&table, &f.schema_type, &[column("b", 0)])
            .await
            .unwrap();
        assert_eq!(second.stale_delete_failures.len(), 1);
        assert!(f.repository.entity(&a).is_some());
        assert_eq!(
            f.audit
                .get_entries(&AuditQuery {
                    code: Some(AuditCode::StaleColumnDeleteFailed),
                    ..AuditQuery::default()
                })
                .len(),
            1
        );

        f.repository.clear_faults();
        let third = f
            .reconciler
            .reconcile(&table, &f.schema_type, &[column("b", 0)])
            .await
            .unwrap();
        assert_eq!(third.deleted_columns, vec![a.clone()]);
        assert!(f.repository.entity(&a).is_none());
    }

    #[tokio::test]
    async fn test_ignore_policy_does_not_audit() {
        let f = fixture(StaleColumnPolicy::Ignore).await;
        let table = table();
        let first = f
            .reconciler
            .reconcile(&table, &f.schema_type, &[column("a", 0), column("b", 1)])
            .await
            .unwrap();
        f.repository.fail_delete_of(
            &first.columns[0].guid,
            RepositoryError::connection_failed("flaky"),
        );
        let second = f
            .reconciler
            .reconcile(&table, &f.schema_type, &[column("b", 0)])
            .await
            .unwrap();
        assert_eq!(second.stale_delete_failures.len(), 1);
        assert_eq!(f.audit.get_stats().total, 0);
    }

    #[tokio::test]
    async fn test_renamed_table_records_display_name() {
        let f = fixture(StaleColumnPolicy::RetryNextRun).await;
        let outcome = f
            .reconciler
            .reconcile(&table(), &f.schema_type, &[column("a", 0)])
            .await
            .unwrap();
        let stored = f.repository.entity(&outcome.table.guid).unwrap();
        let additional = match &stored.properties[keys::ADDITIONAL_PROPERTIES] {
            lineage_core::PropertyValue::Map(map) => map.clone(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(additional.get(keys::DISPLAY_NAME).map(String::as_str), Some("orders_raw"));
    }

    #[tokio::test]
    async fn test_empty_columns_rejected_and_retract_removes_subtree() {
        let f = fixture(StaleColumnPolicy::RetryNextRun).await;
        let table = table();
        assert!(matches!(
            f.reconciler.reconcile(&table, &f.schema_type, &[]).await,
            Err(SyncError::Validation { .. })
        ));

        let outcome = f
            .reconciler
            .reconcile(&table, &f.schema_type, &[column("a", 0), column("b", 1)])
            .await
            .unwrap();
        let retracted = f.reconciler.retract_view(&table).await.unwrap();

        assert_eq!(retracted.deleted_columns.len(), 2);
        assert_eq!(retracted.table_type, Some(outcome.table_type.guid.clone()));
        assert_eq!(retracted.table, Some(outcome.table.guid.clone()));
        for kind in [
            EntityKind::RelationalTable,
            EntityKind::RelationalTableType,
            EntityKind::DerivedRelationalColumn,
            EntityKind::RelationalColumnType,
        ] {
            assert!(f
                .repository
                .entities_of_type(kind.default_name())
                .is_empty());
        }
        // The schema type above the table is untouched
        assert!(f.repository.entity(&f.schema_type.guid).is_some());

        let again = f.reconciler.retract_view(&table).await.unwrap();
        assert!(again.is_noop());
    }
}
