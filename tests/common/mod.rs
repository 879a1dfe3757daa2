#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};

use lineage_core::{EntityGuid, GraphEntity, Properties, TypeCatalog};
use lineage_sync_lib::audit::AuditStore;
use lineage_sync_lib::config::{RetrySettings, SyncConfig};
use lineage_sync_lib::repository::InMemoryRepository;
use lineage_sync_lib::SyncService;

pub struct Harness {
    pub repository: Arc<InMemoryRepository>,
    pub service: SyncService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_attempts(3)
    }

    pub fn with_attempts(max_attempts: u32) -> Self {
        let repository = Arc::new(InMemoryRepository::new());
        let config = SyncConfig {
            retry: RetrySettings {
                max_attempts,
                initial_delay_ms: 1,
                max_delay_ms: 5,
                multiplier: 2.0,
                jitter: false,
            },
            ..SyncConfig::default()
        };
        let service = SyncService::with_parts(
            config,
            Arc::new(TypeCatalog::default()),
            repository.clone(),
            Arc::new(AuditStore::in_memory()),
        );
        Self {
            repository,
            service,
        }
    }

    /// Seeds an upstream column owned by another service
    pub fn seed_source_column(&self, guid: &str) {
        self.seed(guid, "RelationalColumn", &format!("(RelationalColumn)=upstream.{}", guid));
    }

    pub fn seed_term(&self, guid: &str) {
        self.seed(guid, "GlossaryTerm", &format!("(GlossaryTerm)={}", guid));
    }

    fn seed(&self, guid: &str, type_name: &str, qualified_name: &str) {
        self.repository
            .insert_entity(GraphEntity {
                guid: EntityGuid::from(guid),
                type_name: type_name.to_string(),
                qualified_name: qualified_name.to_string(),
                properties: Properties::new(),
                external_source: None,
            })
            .unwrap();
    }

    /// Guid of the single entity of `type_name`
    pub fn only(&self, type_name: &str) -> GraphEntity {
        let entities = self.repository.entities_of_type(type_name);
        assert_eq!(entities.len(), 1, "expected exactly one {}", type_name);
        entities.into_iter().next().unwrap()
    }

    /// Names of the columns attached to the table type node
    pub fn column_names(&self) -> Vec<String> {
        let table_type = self.only("RelationalTableType");
        let mut names: Vec<String> = self
            .repository
            .relationships_of_type("AttributeForSchema")
            .into_iter()
            .filter(|rel| rel.from == table_type.guid)
            .filter_map(|rel| self.repository.entity(&rel.to))
            .filter_map(|e| e.properties.get("name").and_then(|v| v.as_str()).map(str::to_string))
            .collect();
        names.sort();
        names
    }
}

pub fn column(name: &str, position: i64, source: Option<&str>) -> Value {
    let mut column = json!({ "name": name, "type": "decimal", "position": position });
    if let Some(source) = source {
        column["sourceColumn"] = json!({ "guid": source });
    }
    column
}

pub fn view_event(columns: Vec<Value>) -> String {
    json!({
        "eventType": "NEW_VIEW_EVENT",
        "tableSource": {
            "name": "orders",
            "schemaName": "sales",
            "databaseSource": {
                "name": "shop",
                "endpointSource": {
                    "protocol": "tcp://",
                    "networkAddress": "db.example.com:5432",
                    "user": "etl",
                    "connectorProviderName": "org.example.PostgresConnectorProvider"
                }
            }
        },
        "derivedColumns": columns
    })
    .to_string()
}

pub fn deployed_schema_event() -> String {
    json!({
        "eventType": "NEW_DEPLOYED_DB_SCHEMA_EVENT",
        "deployedDatabaseSchema": {
            "name": "keyspace1",
            "connection": {
                "displayName": "cassandra",
                "endpoint": { "address": "cass.local:9042", "protocol": "cql" },
                "connectorType": "org.example.CassandraConnectorProvider"
            },
            "externalSource": { "guid": "X1", "name": "cassandra-cluster" }
        }
    })
    .to_string()
}
