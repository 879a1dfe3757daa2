// SPDX-License-Identifier: Apache-2.0

//! Per-call timeouts for repository adapters

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::warn;

use lineage_core::{
    EntityGuid, ExternalSource, GraphEntity, GraphRelationship, MetadataRepository, Properties,
    RepositoryError, RepositoryResult,
};

/// Decorator bounding every repository call by a fixed timeout
///
/// An elapsed call surfaces as [`RepositoryError::Timeout`], which is
/// retryable.
pub struct TimedRepository {
    inner: Arc<dyn MetadataRepository>,
    limit: Duration,
}

impl TimedRepository {
    pub fn new(inner: Arc<dyn MetadataRepository>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> RepositoryResult<T>
    where
        F: Future<Output = RepositoryResult<T>> + Send,
    {
        match timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = self.limit.as_millis() as u64;
                warn!(
                    repository = self.inner.repository_id(),
                    operation, timeout_ms, "Repository call timed out"
                );
                Err(RepositoryError::Timeout { timeout_ms })
            }
        }
    }
}

#[async_trait]
impl MetadataRepository for TimedRepository {
    fn repository_id(&self) -> &'static str {
        self.inner.repository_id()
    }

    async fn find_by_qualified_name(
        &self,
        type_name: &str,
        qualified_name: &str,
    ) -> RepositoryResult<Option<GraphEntity>> {
        self.bounded(
            "find_by_qualified_name",
            self.inner.find_by_qualified_name(type_name, qualified_name),
        )
        .await
    }

    async fn create_entity(
        &self,
        type_name: &str,
        properties: &Properties,
        external_source: Option<&ExternalSource>,
    ) -> RepositoryResult<EntityGuid> {
        self.bounded(
            "create_entity",
            self.inner.create_entity(type_name, properties, external_source),
        )
        .await
    }

    async fn update_entity(
        &self,
        guid: &EntityGuid,
        type_name: &str,
        properties: &Properties,
    ) -> RepositoryResult<()> {
        self.bounded(
            "update_entity",
            self.inner.update_entity(guid, type_name, properties),
        )
        .await
    }

    async fn create_relationship(
        &self,
        relationship_type: &str,
        from: &EntityGuid,
        to: &EntityGuid,
        properties: &Properties,
    ) -> RepositoryResult<GraphRelationship> {
        self.bounded(
            "create_relationship",
            self.inner
                .create_relationship(relationship_type, from, to, properties),
        )
        .await
    }

    async fn list_relationships_by_type(
        &self,
        guid: &EntityGuid,
        relationship_type: &str,
    ) -> RepositoryResult<Vec<GraphRelationship>> {
        self.bounded(
            "list_relationships_by_type",
            self.inner.list_relationships_by_type(guid, relationship_type),
        )
        .await
    }

    async fn delete_entity(&self, guid: &EntityGuid, type_name: &str) -> RepositoryResult<()> {
        self.bounded("delete_entity", self.inner.delete_entity(guid, type_name))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowRepository;

    #[async_trait]
    impl MetadataRepository for SlowRepository {
        fn repository_id(&self) -> &'static str {
            "slow"
        }

        async fn find_by_qualified_name(
            &self,
            _type_name: &str,
            _qualified_name: &str,
        ) -> RepositoryResult<Option<GraphEntity>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }

        async fn create_entity(
            &self,
            _type_name: &str,
            _properties: &Properties,
            _external_source: Option<&ExternalSource>,
        ) -> RepositoryResult<EntityGuid> {
            Ok(EntityGuid::from("fast"))
        }

        async fn update_entity(
            &self,
            _guid: &EntityGuid,
            _type_name: &str,
            _properties: &Properties,
        ) -> RepositoryResult<()> {
            Ok(())
        }

        async fn create_relationship(
            &self,
            _relationship_type: &str,
            _from: &EntityGuid,
            _to: &EntityGuid,
            _properties: &Properties,
        ) -> RepositoryResult<GraphRelationship> {
            Err(RepositoryError::unauthorized("read only"))
        }

        async fn list_relationships_by_type(
            &self,
            _guid: &EntityGuid,
            _relationship_type: &str,
        ) -> RepositoryResult<Vec<GraphRelationship>> {
            Ok(Vec::new())
        }

        async fn delete_entity(&self, _guid: &EntityGuid, _type_name: &str) -> RepositoryResult<()> {
            Ok(())
        }
    }

    fn timed() -> TimedRepository {
        TimedRepository::new(Arc::new(SlowRepository), Duration::from_millis(20))
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_call_is_retryable_timeout() {
        let err = timed()
            .find_by_qualified_name("Database", "(Database)=x")
            .await
            .unwrap_err();
        assert_eq!(err, RepositoryError::Timeout { timeout_ms: 20 });
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_fast_calls_pass_through() {
        let repo = timed();
        let guid = repo
            .create_entity("Database", &Properties::new(), None)
            .await
            .unwrap();
        assert_eq!(guid.as_str(), "fast");

        let err = repo
            .create_relationship("ServerEndpoint", &guid, &guid, &Properties::new())
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
