//! MetadataRepository trait definition
//!
//! This is the narrow interface through which the reconciliation engine
//! reads and writes the external metadata graph. The engine owns no durable
//! state; everything it needs between runs is re-derived through these calls.

use async_trait::async_trait;

use crate::error::RepositoryResult;
use crate::types::{EntityGuid, ExternalSource, GraphEntity, GraphRelationship, Properties};

/// Core trait that every metadata store adapter must implement
///
/// Each call is one suspension point (typically a network round trip).
/// Implementations are expected to serialize conflicting writes to the same
/// qualified name internally; the engine never locks across calls.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Returns the unique identifier of this adapter (e.g. "memory", "omrs")
    fn repository_id(&self) -> &'static str;

    /// Looks up an entity by type and qualified name
    ///
    /// Absence is `Ok(None)`, not an error.
    async fn find_by_qualified_name(
        &self,
        type_name: &str,
        qualified_name: &str,
    ) -> RepositoryResult<Option<GraphEntity>>;

    /// Creates an entity and returns its store-assigned identifier
    ///
    /// `properties` must carry the `qualifiedName` key. When `external_source`
    /// is set the entity is recorded as owned by that source.
    async fn create_entity(
        &self,
        type_name: &str,
        properties: &Properties,
        external_source: Option<&ExternalSource>,
    ) -> RepositoryResult<EntityGuid>;

    /// Replaces the properties of an existing entity
    async fn update_entity(
        &self,
        guid: &EntityGuid,
        type_name: &str,
        properties: &Properties,
    ) -> RepositoryResult<()>;

    /// Creates a typed edge `from -> to`
    async fn create_relationship(
        &self,
        relationship_type: &str,
        from: &EntityGuid,
        to: &EntityGuid,
        properties: &Properties,
    ) -> RepositoryResult<GraphRelationship>;

    /// Lists relationships of one type touching `guid` at either end
    async fn list_relationships_by_type(
        &self,
        guid: &EntityGuid,
        relationship_type: &str,
    ) -> RepositoryResult<Vec<GraphRelationship>>;

    /// Deletes an entity together with every relationship attached to it
    async fn delete_entity(&self, guid: &EntityGuid, type_name: &str) -> RepositoryResult<()>;
}
