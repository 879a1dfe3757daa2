// SPDX-License-Identifier: Apache-2.0

//! Type catalog
//!
//! Maps the symbolic entity and relationship kinds the engine works with to
//! the type descriptors of the metadata store. Builders select descriptors
//! by lookup, so a deployment can rename or re-key a type without touching
//! the reconciliation code.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Name and (optional) store GUID of a graph type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub guid: Option<String>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>, guid: Option<&str>) -> Self {
        Self {
            name: name.into(),
            guid: guid.map(str::to_string),
        }
    }
}

/// Entity kinds materialized by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    SoftwareServer,
    Endpoint,
    Connection,
    ConnectorType,
    Database,
    InformationView,
    DeployedDatabaseSchema,
    RelationalDbSchemaType,
    RelationalTable,
    RelationalTableType,
    RelationalColumnType,
    DerivedRelationalColumn,
}

impl EntityKind {
    pub const ALL: [EntityKind; 12] = [
        EntityKind::SoftwareServer,
        EntityKind::Endpoint,
        EntityKind::Connection,
        EntityKind::ConnectorType,
        EntityKind::Database,
        EntityKind::InformationView,
        EntityKind::DeployedDatabaseSchema,
        EntityKind::RelationalDbSchemaType,
        EntityKind::RelationalTable,
        EntityKind::RelationalTableType,
        EntityKind::RelationalColumnType,
        EntityKind::DerivedRelationalColumn,
    ];

    /// Open metadata type name
    pub fn default_name(&self) -> &'static str {
        match self {
            Self::SoftwareServer => "SoftwareServer",
            Self::Endpoint => "Endpoint",
            Self::Connection => "Connection",
            Self::ConnectorType => "ConnectorType",
            Self::Database => "Database",
            Self::InformationView => "InformationView",
            Self::DeployedDatabaseSchema => "DeployedDatabaseSchema",
            Self::RelationalDbSchemaType => "RelationalDBSchemaType",
            Self::RelationalTable => "RelationalTable",
            Self::RelationalTableType => "RelationalTableType",
            Self::RelationalColumnType => "RelationalColumnType",
            Self::DerivedRelationalColumn => "DerivedRelationalColumn",
        }
    }

    fn default_guid(&self) -> Option<&'static str> {
        match self {
            Self::SoftwareServer => Some("aa7c7884-32ce-4991-9c41-9778f1fec6aa"),
            Self::Endpoint => Some("dbc20663-d705-4ff0-8424-80c262c6b8e7"),
            Self::Connection => Some("114e9f8f-5ff3-4c32-bd37-a7eb42712253"),
            Self::ConnectorType => Some("954421eb-33a6-462d-a8ca-b5709a1bd0d4"),
            Self::Database => Some("0921c83f-b2db-4086-a52c-0d10e52ca078"),
            Self::InformationView => Some("68d7b905-6438-43be-88cf-5de027b4aaaf"),
            Self::RelationalDbSchemaType => Some("f20f5f45-1afb-41c1-9a09-34d8812626a4"),
            _ => None,
        }
    }
}

/// Relationship kinds created by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipKind {
    ServerEndpoint,
    ConnectionEndpoint,
    ConnectionConnectorType,
    ConnectionToAsset,
    DataContentForDataSet,
    AssetSchemaType,
    AttributeForSchema,
    SchemaAttributeType,
    SchemaQueryImplementation,
    SemanticAssignment,
}

impl RelationshipKind {
    pub const ALL: [RelationshipKind; 10] = [
        RelationshipKind::ServerEndpoint,
        RelationshipKind::ConnectionEndpoint,
        RelationshipKind::ConnectionConnectorType,
        RelationshipKind::ConnectionToAsset,
        RelationshipKind::DataContentForDataSet,
        RelationshipKind::AssetSchemaType,
        RelationshipKind::AttributeForSchema,
        RelationshipKind::SchemaAttributeType,
        RelationshipKind::SchemaQueryImplementation,
        RelationshipKind::SemanticAssignment,
    ];

    pub fn default_name(&self) -> &'static str {
        match self {
            Self::ServerEndpoint => "ServerEndpoint",
            Self::ConnectionEndpoint => "ConnectionEndpoint",
            Self::ConnectionConnectorType => "ConnectionConnectorType",
            Self::ConnectionToAsset => "ConnectionToAsset",
            Self::DataContentForDataSet => "DataContentForDataSet",
            Self::AssetSchemaType => "AssetSchemaType",
            Self::AttributeForSchema => "AttributeForSchema",
            Self::SchemaAttributeType => "SchemaAttributeType",
            Self::SchemaQueryImplementation => "SchemaQueryImplementation",
            Self::SemanticAssignment => "SemanticAssignment",
        }
    }

    fn default_guid(&self) -> Option<&'static str> {
        match self {
            Self::ServerEndpoint => Some("2b8bfab4-8023-4611-9833-82a0dc95f187"),
            Self::ConnectionEndpoint => Some("887a7132-d6bc-4b92-a483-e80b60c86fb2"),
            Self::ConnectionConnectorType => Some("e542cfc1-0b4b-42b9-9921-f0a5a88aaf96"),
            Self::ConnectionToAsset => Some("e777d660-8dbe-453e-8b83-903771f054c0"),
            Self::DataContentForDataSet => Some("b827683c-2924-4df3-a92d-7be1888e23c0"),
            Self::AssetSchemaType => Some("815b004d-73c6-4728-9dd9-536f4fe803cd"),
            _ => None,
        }
    }
}

/// Registry of type descriptors, built-ins plus overrides
#[derive(Debug, Clone)]
pub struct TypeCatalog {
    entities: HashMap<EntityKind, TypeDescriptor>,
    relationships: HashMap<RelationshipKind, TypeDescriptor>,
}

impl TypeCatalog {
    /// Catalog populated with the open metadata type system
    pub fn open_metadata() -> Self {
        let entities = EntityKind::ALL
            .iter()
            .map(|kind| {
                (
                    *kind,
                    TypeDescriptor::new(kind.default_name(), kind.default_guid()),
                )
            })
            .collect();
        let relationships = RelationshipKind::ALL
            .iter()
            .map(|kind| {
                (
                    *kind,
                    TypeDescriptor::new(kind.default_name(), kind.default_guid()),
                )
            })
            .collect();

        Self {
            entities,
            relationships,
        }
    }

    /// Replaces the descriptor of an entity kind
    pub fn with_entity(mut self, kind: EntityKind, descriptor: TypeDescriptor) -> Self {
        self.entities.insert(kind, descriptor);
        self
    }

    /// Replaces the descriptor of a relationship kind
    pub fn with_relationship(mut self, kind: RelationshipKind, descriptor: TypeDescriptor) -> Self {
        self.relationships.insert(kind, descriptor);
        self
    }

    pub fn entity(&self, kind: EntityKind) -> &TypeDescriptor {
        // Every kind is seeded in open_metadata() and overrides only replace.
        &self.entities[&kind]
    }

    pub fn relationship(&self, kind: RelationshipKind) -> &TypeDescriptor {
        &self.relationships[&kind]
    }

    pub fn entity_name(&self, kind: EntityKind) -> &str {
        &self.entity(kind).name
    }

    pub fn relationship_name(&self, kind: RelationshipKind) -> &str {
        &self.relationship(kind).name
    }

    /// Reverse lookup, used when the store hands back a type name
    pub fn entity_kind(&self, type_name: &str) -> Option<EntityKind> {
        self.entities
            .iter()
            .find(|(_, descriptor)| descriptor.name == type_name)
            .map(|(kind, _)| *kind)
    }
}

impl Default for TypeCatalog {
    fn default() -> Self {
        Self::open_metadata()
    }
}
