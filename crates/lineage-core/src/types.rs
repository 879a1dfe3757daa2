// SPDX-License-Identifier: Apache-2.0

//! Graph data types shared by the engine and repository adapters
//!
//! These types are the materialized form of everything the engine writes:
//! entities keyed by qualified name, typed relationships between them, and
//! the property bags attached to both.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Property keys used on the entities the engine creates
pub mod keys {
    pub const QUALIFIED_NAME: &str = "qualifiedName";
    pub const NAME: &str = "name";
    pub const DISPLAY_NAME: &str = "displayName";
    pub const DESCRIPTION: &str = "description";
    pub const OWNER: &str = "owner";
    pub const NETWORK_ADDRESS: &str = "networkAddress";
    pub const PROTOCOL: &str = "protocol";
    pub const ENCRYPTION_METHOD: &str = "encryptionMethod";
    pub const CONNECTOR_PROVIDER_CLASS_NAME: &str = "connectorProviderClassName";
    pub const AUTHOR: &str = "author";
    pub const USAGE: &str = "usage";
    pub const ENCODING_STANDARD: &str = "encodingStandard";
    pub const DATA_TYPE: &str = "dataType";
    pub const FORMULA: &str = "formula";
    pub const POSITION: &str = "position";
    pub const ADDITIONAL_PROPERTIES: &str = "additionalProperties";
}

/// Store-assigned identifier of an entity or relationship
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityGuid(pub String);

impl EntityGuid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityGuid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A single property value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Map(BTreeMap<String, String>),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

/// Ordered property bag, so two bags built from the same input compare equal
pub type Properties = BTreeMap<String, PropertyValue>;

/// Fluent builder for entity property bags
#[derive(Debug, Default, Clone)]
pub struct PropertiesBuilder {
    properties: Properties,
}

impl PropertiesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_string(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties
            .insert(key.to_string(), PropertyValue::String(value.into()));
        self
    }

    pub fn with_int(mut self, key: &str, value: i64) -> Self {
        self.properties.insert(key.to_string(), PropertyValue::Int(value));
        self
    }

    pub fn with_map(mut self, key: &str, value: BTreeMap<String, String>) -> Self {
        self.properties.insert(key.to_string(), PropertyValue::Map(value));
        self
    }

    pub fn build(self) -> Properties {
        self.properties
    }
}

/// The external system that reported an entity
///
/// Entities created on behalf of an external source are owned by it in the
/// metadata store, rather than by the local server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalSource {
    pub guid: String,
    pub name: String,
}

/// Materialized node of the metadata graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEntity {
    pub guid: EntityGuid,
    pub type_name: String,
    pub qualified_name: String,
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_source: Option<ExternalSource>,
}

/// Typed directed edge between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRelationship {
    pub guid: EntityGuid,
    pub type_name: String,
    pub from: EntityGuid,
    pub to: EntityGuid,
    /// Type of the far-end entity, needed to delete it without another lookup
    pub to_type_name: String,
    #[serde(default)]
    pub properties: Properties,
}

impl GraphRelationship {
    /// Returns true if this edge leaves `guid`
    pub fn starts_at(&self, guid: &EntityGuid) -> bool {
        &self.from == guid
    }

    pub fn connects(&self, from: &EntityGuid, to: &EntityGuid) -> bool {
        &self.from == from && &self.to == to
    }
}
