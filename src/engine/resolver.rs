// SPDX-License-Identifier: Apache-2.0

//! Entity upsert resolver
//!
//! The idempotency boundary of the engine: every node is found-or-created by
//! qualified name and every edge is created only if it does not exist yet, so
//! re-running a reconciliation with unchanged input writes nothing new.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};

use lineage_core::types::keys;
use lineage_core::{
    EntityGuid, EntityKind, ExternalSource, GraphEntity, MetadataRepository, Properties,
    PropertyValue, RelationshipKind, RepositoryResult, TypeCatalog,
};

/// A node resolved by an upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityRef {
    pub guid: EntityGuid,
    pub qualified_name: String,
    /// True if this run created the node
    pub created: bool,
}

pub struct EntityResolver {
    repository: Arc<dyn MetadataRepository>,
    catalog: Arc<TypeCatalog>,
}

impl EntityResolver {
    pub fn new(repository: Arc<dyn MetadataRepository>, catalog: Arc<TypeCatalog>) -> Self {
        Self {
            repository,
            catalog,
        }
    }

    pub fn repository(&self) -> &Arc<dyn MetadataRepository> {
        &self.repository
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    /// Finds an entity by qualified name, or creates it
    ///
    /// An existing entity is updated only when its stored properties differ
    /// from `properties`. The `qualifiedName` property is always set.
    #[instrument(skip(self, properties, external_source), fields(kind = ?kind))]
    pub async fn upsert(
        &self,
        kind: EntityKind,
        qualified_name: &str,
        mut properties: Properties,
        external_source: Option<&ExternalSource>,
    ) -> RepositoryResult<EntityRef> {
        let type_name = self.catalog.entity_name(kind);
        properties.insert(
            keys::QUALIFIED_NAME.to_string(),
            PropertyValue::String(qualified_name.to_string()),
        );

        match self
            .repository
            .find_by_qualified_name(type_name, qualified_name)
            .await?
        {
            Some(existing) => {
                if existing.properties != properties {
                    self.repository
                        .update_entity(&existing.guid, type_name, &properties)
                        .await?;
                    debug!(guid = %existing.guid, "Updated entity");
                }
                Ok(EntityRef {
                    guid: existing.guid,
                    qualified_name: qualified_name.to_string(),
                    created: false,
                })
            }
            None => {
                let guid = self
                    .repository
                    .create_entity(type_name, &properties, external_source)
                    .await?;
                debug!(guid = %guid, "Created entity");
                Ok(EntityRef {
                    guid,
                    qualified_name: qualified_name.to_string(),
                    created: true,
                })
            }
        }
    }

    /// Looks up an entity without creating it
    pub async fn find(
        &self,
        kind: EntityKind,
        qualified_name: &str,
    ) -> RepositoryResult<Option<GraphEntity>> {
        self.repository
            .find_by_qualified_name(self.catalog.entity_name(kind), qualified_name)
            .await
    }

    /// Creates the edge `from -> to` unless it already exists
    ///
    /// Returns true if an edge was created.
    pub async fn ensure_relationship(
        &self,
        kind: RelationshipKind,
        from: &EntityGuid,
        to: &EntityGuid,
    ) -> RepositoryResult<bool> {
        let type_name = self.catalog.relationship_name(kind);
        let existing = self
            .repository
            .list_relationships_by_type(from, type_name)
            .await?;
        if existing.iter().any(|rel| rel.connects(from, to)) {
            return Ok(false);
        }

        self.repository
            .create_relationship(type_name, from, to, &Properties::new())
            .await?;
        debug!(relationship = type_name, %from, %to, "Created relationship");
        Ok(true)
    }

    /// Deletes an entity of a known kind
    pub async fn delete(&self, kind: EntityKind, guid: &EntityGuid) -> RepositoryResult<()> {
        self.repository
            .delete_entity(guid, self.catalog.entity_name(kind))
            .await
    }
}
