// SPDX-License-Identifier: Apache-2.0

//! Change notifications
//!
//! Wire format of the inbound notifications and their decoding into typed
//! commands. Payloads are JSON documents discriminated by `eventType`; field
//! names are camelCase and unknown fields are ignored.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lineage_core::ExternalSource;

use crate::error::{SyncError, SyncResult};
use crate::observability::Sensitive;

pub const NEW_VIEW_EVENT: &str = "NEW_VIEW_EVENT";
pub const NEW_DEPLOYED_DB_SCHEMA_EVENT: &str = "NEW_DEPLOYED_DB_SCHEMA_EVENT";

/// Database name used when a deployed schema does not report one
pub const DEFAULT_DEPLOYED_DATABASE_NAME: &str = "Apache Cassandra Data Store";

/// A reachable network location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    #[serde(default)]
    pub protocol: String,
    #[serde(alias = "address")]
    pub network_address: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, alias = "connectorProviderClassName")]
    pub connector_provider_name: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub encryption_method: Option<String>,
    /// Credential of `user`; never written to the graph
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Sensitive<String>>,
}

impl EndpointDescriptor {
    pub fn host(&self) -> &str {
        lineage_core::qualified_name::host_of(&self.network_address)
    }

    /// Discriminator of the connection reaching this endpoint
    pub fn connection_discriminator(&self) -> &str {
        self.user
            .as_deref()
            .filter(|u| !u.is_empty())
            .or_else(|| self.display_name.as_deref().filter(|n| !n.is_empty()))
            .unwrap_or(&self.network_address)
    }

    fn validate(&self, context: &str) -> SyncResult<()> {
        if self.network_address.trim().is_empty() {
            return Err(SyncError::validation(format!(
                "{}: endpoint network address is required",
                context
            )));
        }
        Ok(())
    }
}

/// How a source system is reached
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    #[serde(default)]
    pub display_name: Option<String>,
    pub endpoint: EndpointDescriptor,
    /// Connector provider class; falls back to the endpoint's
    #[serde(default)]
    pub connector_type: Option<String>,
}

impl ConnectionDescriptor {
    pub fn discriminator(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.endpoint.connection_discriminator())
    }

    pub fn connector_provider(&self) -> Option<&str> {
        self.connector_type
            .as_deref()
            .or(self.endpoint.connector_provider_name.as_deref())
            .filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSource {
    pub name: String,
    #[serde(alias = "endpointSource")]
    pub endpoint: EndpointDescriptor,
}

/// A relational table or view as reported by the source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSource {
    pub name: String,
    /// Name of the table the view was derived from, when it differs
    #[serde(default)]
    pub original_name: Option<String>,
    pub schema_name: String,
    pub database_source: DatabaseSource,
}

impl TableSource {
    pub fn host(&self) -> &str {
        self.database_source.endpoint.host()
    }

    /// Display name to record on the table node, if the view was renamed
    pub fn display_name(&self) -> Option<&str> {
        self.original_name
            .as_deref()
            .filter(|original| !original.is_empty() && *original != self.name)
    }
}

/// Semantic tag attached to a column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessTerm {
    pub guid: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Upstream column a derived column is computed from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceColumn {
    pub guid: String,
    #[serde(default)]
    pub qualified_name: Option<String>,
    #[serde(default)]
    pub business_terms: Vec<BusinessTerm>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedColumn {
    pub name: String,
    #[serde(rename = "type", alias = "dataType", default)]
    pub data_type: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub formula: Option<String>,
    #[serde(default)]
    pub source_column: Option<SourceColumn>,
    #[serde(default)]
    pub business_terms: Vec<BusinessTerm>,
}

impl DerivedColumn {
    /// Terms of the column merged with those of its source, first occurrence wins
    pub fn terms(&self) -> Vec<&BusinessTerm> {
        let inherited = self
            .source_column
            .iter()
            .flat_map(|source| source.business_terms.iter());
        let mut seen = HashSet::new();
        self.business_terms
            .iter()
            .chain(inherited)
            .filter(|term| seen.insert(term.guid.as_str()))
            .collect()
    }

    /// Identifier of the upstream column, if one was reported
    pub fn source_guid(&self) -> Option<&str> {
        self.source_column
            .as_ref()
            .map(|source| source.guid.as_str())
            .filter(|guid| !guid.is_empty())
    }
}

/// Schema deployed on a data platform
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployedDatabaseSchema {
    pub name: String,
    #[serde(default)]
    pub database_name: Option<String>,
    pub connection: ConnectionDescriptor,
    #[serde(default)]
    pub external_source: Option<ExternalSource>,
}

impl DeployedDatabaseSchema {
    pub fn database_name(&self) -> &str {
        self.database_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DEPLOYED_DATABASE_NAME)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewViewEvent {
    pub table_source: TableSource,
    #[serde(default)]
    pub derived_columns: Vec<DerivedColumn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDeployedSchemaEvent {
    pub deployed_database_schema: DeployedDatabaseSchema,
}

/// A decoded notification
#[derive(Debug, Clone)]
pub enum ChangeNotification {
    NewView(NewViewEvent),
    NewDeployedSchema(NewDeployedSchemaEvent),
}

/// Result of decoding a payload whose envelope is well-formed
#[derive(Debug, Clone)]
pub enum Decoded {
    Known(ChangeNotification),
    /// The discriminator names an event this service does not handle
    Unknown(String),
}

impl ChangeNotification {
    /// Decodes a JSON payload
    ///
    /// Fails with [`SyncError::Decode`] for malformed JSON or bodies that do
    /// not match their declared kind, and [`SyncError::Validation`] when the
    /// `eventType` discriminator is missing.
    pub fn decode(payload: &str) -> SyncResult<Decoded> {
        let value: Value = serde_json::from_str(payload)?;
        let kind = value
            .get("eventType")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::validation("missing eventType discriminator"))?
            .to_string();

        let notification = match kind.as_str() {
            NEW_VIEW_EVENT => Self::NewView(serde_json::from_value(value)?),
            NEW_DEPLOYED_DB_SCHEMA_EVENT => Self::NewDeployedSchema(serde_json::from_value(value)?),
            _ => return Ok(Decoded::Unknown(kind)),
        };
        Ok(Decoded::Known(notification))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewView(_) => NEW_VIEW_EVENT,
            Self::NewDeployedSchema(_) => NEW_DEPLOYED_DB_SCHEMA_EVENT,
        }
    }

    /// Checks required fields before anything touches the repository
    pub fn validate(&self) -> SyncResult<()> {
        match self {
            Self::NewView(event) => {
                let table = &event.table_source;
                require(&table.name, "table name")?;
                require(&table.schema_name, "schema name")?;
                require(&table.database_source.name, "database name")?;
                table.database_source.endpoint.validate("table source")?;

                let mut names = HashSet::new();
                for column in &event.derived_columns {
                    require(&column.name, "column name")?;
                    if !names.insert(column.name.as_str()) {
                        return Err(SyncError::validation(format!(
                            "duplicate column {} in table {}",
                            column.name, table.name
                        )));
                    }
                }
                Ok(())
            }
            Self::NewDeployedSchema(event) => {
                let schema = &event.deployed_database_schema;
                require(&schema.name, "deployed schema name")?;
                schema.connection.endpoint.validate("deployed schema")
            }
        }
    }
}

fn require(value: &str, what: &str) -> SyncResult<()> {
    if value.trim().is_empty() {
        return Err(SyncError::validation(format!("{} is required", what)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEW: &str = r#"{
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
                    "password": "hunter2"
                }
            }
        },
        "derivedColumns": [
            {"name": "total", "type": "decimal", "position": 0,
             "sourceColumn": {"guid": "C1", "businessTerms": [{"guid": "T1"}, {"guid": "T2"}]},
             "businessTerms": [{"guid": "T2", "name": "Revenue"}]}
        ],
        "extra": true
    }"#;

    fn decode_known(payload: &str) -> ChangeNotification {
        match ChangeNotification::decode(payload).unwrap() {
            Decoded::Known(notification) => notification,
            Decoded::Unknown(kind) => panic!("unexpected unknown kind {}", kind),
        }
    }

    #[test]
    fn test_decode_view_event() {
        let notification = decode_known(VIEW);
        assert_eq!(notification.kind(), NEW_VIEW_EVENT);
        notification.validate().unwrap();

        let ChangeNotification::NewView(event) = notification else {
            panic!("expected a view event");
        };
        assert_eq!(event.table_source.host(), "db.example.com");
        assert_eq!(event.table_source.database_source.endpoint.connection_discriminator(), "etl");

        let column = &event.derived_columns[0];
        assert_eq!(column.data_type, "decimal");
        assert_eq!(column.source_guid(), Some("C1"));
        let terms: Vec<&str> = column.terms().iter().map(|t| t.guid.as_str()).collect();
        assert_eq!(terms, vec!["T2", "T1"]);
    }

    #[test]
    fn test_password_is_not_reserialized() {
        let ChangeNotification::NewView(event) = decode_known(VIEW) else {
            panic!("expected a view event");
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!format!("{:?}", event).contains("hunter2"));
    }

    #[test]
    fn test_unknown_kind_is_not_an_error() {
        let decoded = ChangeNotification::decode(r#"{"eventType": "NEW_PORT_EVENT"}"#).unwrap();
        assert!(matches!(decoded, Decoded::Unknown(kind) if kind == "NEW_PORT_EVENT"));
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(
            ChangeNotification::decode("{not json"),
            Err(SyncError::Decode(_))
        ));
        assert!(matches!(
            ChangeNotification::decode(r#"{"tableSource": {}}"#),
            Err(SyncError::Validation { .. })
        ));
        assert!(matches!(
            ChangeNotification::decode(r#"{"eventType": "NEW_VIEW_EVENT", "tableSource": 3}"#),
            Err(SyncError::Decode(_))
        ));
    }

    #[test]
    fn test_validation_rejects_missing_fields() {
        let payload = VIEW.replace(r#""schemaName": "sales""#, r#""schemaName": """#);
        let err = decode_known(&payload).validate().unwrap_err();
        assert!(err.to_string().contains("schema name"));

        let payload = VIEW.replace(r#""position": 0,"#, r#""position": 0}, {"name": "total","#);
        let err = decode_known(&payload).validate().unwrap_err();
        assert!(err.to_string().contains("duplicate column"));
    }

    #[test]
    fn test_deployed_schema_defaults() {
        let payload = r#"{
            "eventType": "NEW_DEPLOYED_DB_SCHEMA_EVENT",
            "deployedDatabaseSchema": {
                "name": "keyspace1",
                "connection": {
                    "displayName": "cassandra",
                    "endpoint": {"address": "cass.local:9042", "protocol": "cql"},
                    "connectorType": "org.example.CassandraProvider"
                },
                "externalSource": {"guid": "X1", "name": "cassandra-cluster"}
            }
        }"#;
        let ChangeNotification::NewDeployedSchema(event) = decode_known(payload) else {
            panic!("expected a deployed schema event");
        };
        let schema = &event.deployed_database_schema;
        assert_eq!(schema.database_name(), DEFAULT_DEPLOYED_DATABASE_NAME);
        assert_eq!(schema.connection.discriminator(), "cassandra");
        assert_eq!(
            schema.connection.connector_provider(),
            Some("org.example.CassandraProvider")
        );
        assert_eq!(schema.connection.endpoint.host(), "cass.local");
    }
}
