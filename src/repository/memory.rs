// SPDX-License-Identifier: Apache-2.0

//! In-memory metadata repository
//!
//! A complete [`MetadataRepository`] backed by maps, with JSON snapshots for
//! the command line service and fault injection for tests.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use lineage_core::types::keys;
use lineage_core::{
    EntityGuid, ExternalSource, GraphEntity, GraphRelationship, MetadataRepository, Properties,
    RepositoryError, RepositoryResult,
};

#[derive(Default)]
struct GraphState {
    entities: HashMap<EntityGuid, GraphEntity>,
    /// (type name, qualified name) -> guid
    index: HashMap<(String, String), EntityGuid>,
    relationships: BTreeMap<EntityGuid, GraphRelationship>,
}

#[derive(Default)]
struct Faults {
    /// qualified name -> (remaining failures, `None` for every call; error)
    create: HashMap<String, (Option<usize>, RepositoryError)>,
    delete: HashMap<EntityGuid, RepositoryError>,
    next: Option<(usize, RepositoryError)>,
}

#[derive(Default)]
struct Counters {
    finds: AtomicU64,
    creates: AtomicU64,
    updates: AtomicU64,
    relationships_created: AtomicU64,
    lists: AtomicU64,
    deletes: AtomicU64,
}

/// Number of successful calls per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryStats {
    pub finds: u64,
    pub creates: u64,
    pub updates: u64,
    pub relationships_created: u64,
    pub lists: u64,
    pub deletes: u64,
}

/// Serialized form of the whole graph
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub entities: Vec<GraphEntity>,
    pub relationships: Vec<GraphRelationship>,
}

#[derive(Default)]
pub struct InMemoryRepository {
    state: RwLock<GraphState>,
    faults: Mutex<Faults>,
    counters: Counters,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: GraphSnapshot) -> RepositoryResult<Self> {
        let repository = Self::new();
        {
            let mut state = repository.state.write();
            for entity in snapshot.entities {
                let key = (entity.type_name.clone(), entity.qualified_name.clone());
                if state.index.contains_key(&key) {
                    return Err(RepositoryError::conflict(format!(
                        "duplicate {} {} in snapshot",
                        key.0, key.1
                    )));
                }
                state.index.insert(key, entity.guid.clone());
                state.entities.insert(entity.guid.clone(), entity);
            }
            for relationship in snapshot.relationships {
                if !state.entities.contains_key(&relationship.from)
                    || !state.entities.contains_key(&relationship.to)
                {
                    return Err(RepositoryError::validation(format!(
                        "relationship {} references a missing entity",
                        relationship.guid
                    )));
                }
                state
                    .relationships
                    .insert(relationship.guid.clone(), relationship);
            }
        }
        Ok(repository)
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let state = self.state.read();
        let mut entities: Vec<GraphEntity> = state.entities.values().cloned().collect();
        entities.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
        GraphSnapshot {
            entities,
            relationships: state.relationships.values().cloned().collect(),
        }
    }

    /// Loads a snapshot file, or starts empty when the file does not exist
    pub fn load(path: &Path) -> RepositoryResult<Self> {
        if !path.exists() {
            debug!("No snapshot at {:?}, starting empty", path);
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            RepositoryError::internal(format!("Failed to read snapshot {}: {}", path.display(), e))
        })?;
        let snapshot: GraphSnapshot = serde_json::from_str(&content)
            .map_err(|e| RepositoryError::validation(format!("Invalid snapshot: {}", e)))?;
        let repository = Self::from_snapshot(snapshot)?;
        info!(
            entities = repository.entity_count(),
            relationships = repository.relationship_count(),
            "Loaded repository snapshot"
        );
        Ok(repository)
    }

    pub fn save(&self, path: &Path) -> RepositoryResult<()> {
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| RepositoryError::internal(e.to_string()))?;
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, json)
            .and_then(|_| std::fs::rename(&temp_path, path))
            .map_err(|e| {
                RepositoryError::internal(format!(
                    "Failed to write snapshot {}: {}",
                    path.display(),
                    e
                ))
            })
    }

    /// Stores an entity with a caller-chosen guid
    ///
    /// Used to seed entities owned by other services, such as upstream
    /// columns and glossary terms.
    pub fn insert_entity(&self, entity: GraphEntity) -> RepositoryResult<()> {
        let mut state = self.state.write();
        let key = (entity.type_name.clone(), entity.qualified_name.clone());
        if state.index.contains_key(&key) || state.entities.contains_key(&entity.guid) {
            return Err(RepositoryError::conflict(format!(
                "{} {} already exists",
                key.0, key.1
            )));
        }
        state.index.insert(key, entity.guid.clone());
        state.entities.insert(entity.guid.clone(), entity);
        Ok(())
    }

    /// Makes every create of `qualified_name` fail with `error`
    pub fn fail_create_of(&self, qualified_name: impl Into<String>, error: RepositoryError) {
        self.faults
            .lock()
            .create
            .insert(qualified_name.into(), (None, error));
    }

    /// Makes the next `times` creates of `qualified_name` fail with `error`
    pub fn fail_create_of_times(
        &self,
        qualified_name: impl Into<String>,
        times: usize,
        error: RepositoryError,
    ) {
        if times > 0 {
            self.faults
                .lock()
                .create
                .insert(qualified_name.into(), (Some(times), error));
        }
    }

    /// Makes every delete of `guid` fail with `error`
    pub fn fail_delete_of(&self, guid: &EntityGuid, error: RepositoryError) {
        self.faults.lock().delete.insert(guid.clone(), error);
    }

    /// Makes the next `calls` calls of any kind fail with `error`
    pub fn fail_next(&self, calls: usize, error: RepositoryError) {
        self.faults.lock().next = (calls > 0).then_some((calls, error));
    }

    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    pub fn stats(&self) -> RepositoryStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        RepositoryStats {
            finds: load(&self.counters.finds),
            creates: load(&self.counters.creates),
            updates: load(&self.counters.updates),
            relationships_created: load(&self.counters.relationships_created),
            lists: load(&self.counters.lists),
            deletes: load(&self.counters.deletes),
        }
    }

    pub fn entity_count(&self) -> usize {
        self.state.read().entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.state.read().relationships.len()
    }

    pub fn entity(&self, guid: &EntityGuid) -> Option<GraphEntity> {
        self.state.read().entities.get(guid).cloned()
    }

    /// Entities of one type, ordered by qualified name
    pub fn entities_of_type(&self, type_name: &str) -> Vec<GraphEntity> {
        let state = self.state.read();
        let mut entities: Vec<GraphEntity> = state
            .entities
            .values()
            .filter(|e| e.type_name == type_name)
            .cloned()
            .collect();
        entities.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
        entities
    }

    pub fn relationships_of_type(&self, type_name: &str) -> Vec<GraphRelationship> {
        self.state
            .read()
            .relationships
            .values()
            .filter(|r| r.type_name == type_name)
            .cloned()
            .collect()
    }

    fn check_create_fault(&self, qualified_name: &str) -> RepositoryResult<()> {
        let mut faults = self.faults.lock();
        let Some((remaining, error)) = faults.create.get_mut(qualified_name) else {
            return Ok(());
        };
        let error = error.clone();
        if let Some(remaining) = remaining {
            *remaining -= 1;
            if *remaining == 0 {
                faults.create.remove(qualified_name);
            }
        }
        Err(error)
    }

    fn check_transient(&self) -> RepositoryResult<()> {
        let mut faults = self.faults.lock();
        if let Some((remaining, error)) = faults.next.as_mut() {
            let error = error.clone();
            *remaining -= 1;
            if *remaining == 0 {
                faults.next = None;
            }
            return Err(error);
        }
        Ok(())
    }
}

fn require_type(entity: &GraphEntity, type_name: &str) -> RepositoryResult<()> {
    if entity.type_name != type_name {
        return Err(RepositoryError::validation(format!(
            "entity {} is a {}, not a {}",
            entity.guid, entity.type_name, type_name
        )));
    }
    Ok(())
}

#[async_trait]
impl MetadataRepository for InMemoryRepository {
    fn repository_id(&self) -> &'static str {
        "memory"
    }

    async fn find_by_qualified_name(
        &self,
        type_name: &str,
        qualified_name: &str,
    ) -> RepositoryResult<Option<GraphEntity>> {
        self.check_transient()?;
        self.counters.finds.fetch_add(1, Ordering::Relaxed);
        let state = self.state.read();
        Ok(state
            .index
            .get(&(type_name.to_string(), qualified_name.to_string()))
            .and_then(|guid| state.entities.get(guid))
            .cloned())
    }

    async fn create_entity(
        &self,
        type_name: &str,
        properties: &Properties,
        external_source: Option<&ExternalSource>,
    ) -> RepositoryResult<EntityGuid> {
        self.check_transient()?;
        let qualified_name = properties
            .get(keys::QUALIFIED_NAME)
            .and_then(|v| v.as_str())
            .ok_or_else(|| RepositoryError::validation("qualifiedName property is required"))?
            .to_string();

        self.check_create_fault(&qualified_name)?;

        let mut state = self.state.write();
        let key = (type_name.to_string(), qualified_name.clone());
        if state.index.contains_key(&key) {
            return Err(RepositoryError::conflict(format!(
                "{} {} already exists",
                type_name, qualified_name
            )));
        }

        let guid = EntityGuid::new(Uuid::new_v4().to_string());
        state.index.insert(key, guid.clone());
        state.entities.insert(
            guid.clone(),
            GraphEntity {
                guid: guid.clone(),
                type_name: type_name.to_string(),
                qualified_name,
                properties: properties.clone(),
                external_source: external_source.cloned(),
            },
        );
        self.counters.creates.fetch_add(1, Ordering::Relaxed);
        Ok(guid)
    }

    async fn update_entity(
        &self,
        guid: &EntityGuid,
        type_name: &str,
        properties: &Properties,
    ) -> RepositoryResult<()> {
        self.check_transient()?;
        let mut state = self.state.write();
        let entity = state
            .entities
            .get_mut(guid)
            .ok_or_else(|| RepositoryError::not_found(format!("entity {}", guid)))?;
        require_type(entity, type_name)?;

        let renamed = properties
            .get(keys::QUALIFIED_NAME)
            .and_then(|v| v.as_str())
            .map(|qn| qn != entity.qualified_name)
            .unwrap_or(false);
        if renamed {
            return Err(RepositoryError::validation(
                "qualifiedName of an existing entity cannot change",
            ));
        }

        entity.properties = properties.clone();
        self.counters.updates.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn create_relationship(
        &self,
        relationship_type: &str,
        from: &EntityGuid,
        to: &EntityGuid,
        properties: &Properties,
    ) -> RepositoryResult<GraphRelationship> {
        self.check_transient()?;
        let mut state = self.state.write();
        if !state.entities.contains_key(from) {
            return Err(RepositoryError::not_found(format!("entity {}", from)));
        }
        let to_type_name = state
            .entities
            .get(to)
            .map(|e| e.type_name.clone())
            .ok_or_else(|| RepositoryError::not_found(format!("entity {}", to)))?;

        let relationship = GraphRelationship {
            guid: EntityGuid::new(Uuid::new_v4().to_string()),
            type_name: relationship_type.to_string(),
            from: from.clone(),
            to: to.clone(),
            to_type_name,
            properties: properties.clone(),
        };
        state
            .relationships
            .insert(relationship.guid.clone(), relationship.clone());
        self.counters
            .relationships_created
            .fetch_add(1, Ordering::Relaxed);
        Ok(relationship)
    }

    async fn list_relationships_by_type(
        &self,
        guid: &EntityGuid,
        relationship_type: &str,
    ) -> RepositoryResult<Vec<GraphRelationship>> {
        self.check_transient()?;
        let state = self.state.read();
        if !state.entities.contains_key(guid) {
            return Err(RepositoryError::not_found(format!("entity {}", guid)));
        }
        self.counters.lists.fetch_add(1, Ordering::Relaxed);
        Ok(state
            .relationships
            .values()
            .filter(|r| r.type_name == relationship_type && (&r.from == guid || &r.to == guid))
            .cloned()
            .collect())
    }

    async fn delete_entity(&self, guid: &EntityGuid, type_name: &str) -> RepositoryResult<()> {
        self.check_transient()?;
        if let Some(error) = self.faults.lock().delete.get(guid) {
            return Err(error.clone());
        }

        let mut state = self.state.write();
        let entity = state
            .entities
            .get(guid)
            .ok_or_else(|| RepositoryError::not_found(format!("entity {}", guid)))?;
        require_type(entity, type_name)?;

        let key = (entity.type_name.clone(), entity.qualified_name.clone());
        state.index.remove(&key);
        state.entities.remove(guid);
        state
            .relationships
            .retain(|_, r| &r.from != guid && &r.to != guid);
        self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
