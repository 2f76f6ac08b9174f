//! In-memory tagging store.
//!
//! A complete [`TagStorage`](crate::TagStorage) backend keeping tags and
//! links in process memory. Every mutation runs under a single write
//! guard, so readers observe either the full prior state or the full new
//! state. Useful for tests and for hosts without a database.
//!
//! ## Usage
//!
//! ```rust
//! use tagging_core::{MemoryTagStore, Tagging, TaggingConfig, EntityRef};
//!
//! # tokio_test_block_on(async {
//! let mut tagging = Tagging::new(MemoryTagStore::new(), TaggingConfig::default()).unwrap();
//! tagging.register_kind("parrot").unwrap();
//!
//! let parrot = EntityRef::new("parrot", 1);
//! tagging.update_tags(&parrot, Some("foo bar")).await.unwrap();
//! assert_eq!(tagging.tags_for(&parrot).await.unwrap().len(), 2);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::models::*;
use crate::traits::{AssociationRepository, TagQueryRepository, TagRepository};

#[derive(Debug, Default)]
struct State {
    next_id: TagId,
    tags: BTreeMap<TagId, Tag>,
    by_name: HashMap<String, TagId>,
    /// Links ordered by entity, then tag id.
    links: BTreeSet<(EntityRef, TagId)>,
}

impl State {
    fn get_or_create(&mut self, name: &str) -> (Tag, bool) {
        if let Some(tag) = self.by_name.get(name).and_then(|id| self.tags.get(id)) {
            return (tag.clone(), false);
        }
        self.next_id += 1;
        let tag = Tag {
            id: self.next_id,
            name: name.to_string(),
            created_at_utc: Utc::now(),
        };
        self.by_name.insert(tag.name.clone(), tag.id);
        self.tags.insert(tag.id, tag.clone());
        debug!(
            subsystem = "tagging",
            component = "memory_store",
            op = "get_or_create",
            tag_id = tag.id,
            tag_name = %tag.name,
            "Created tag"
        );
        (tag, true)
    }

    fn sorted_by_name(&self, ids: impl IntoIterator<Item = TagId>) -> Vec<Tag> {
        let mut tags: Vec<Tag> = ids
            .into_iter()
            .filter_map(|id| self.tags.get(&id).cloned())
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        tags
    }

    fn tags_of(&self, entity: &EntityRef) -> Vec<Tag> {
        let ids: Vec<TagId> = self
            .links
            .iter()
            .filter(|(e, _)| e == entity)
            .map(|(_, id)| *id)
            .collect();
        self.sorted_by_name(ids)
    }

    /// Instance ids of `kind` grouped with the subset of `wanted` they carry.
    fn matches(&self, kind: &str, wanted: &HashSet<TagId>) -> BTreeMap<i64, HashSet<TagId>> {
        let mut groups: BTreeMap<i64, HashSet<TagId>> = BTreeMap::new();
        for (entity, tag_id) in &self.links {
            if entity.kind == kind && wanted.contains(tag_id) {
                groups.entry(entity.id).or_default().insert(*tag_id);
            }
        }
        groups
    }

    fn with_all(&self, kind: &str, tag_ids: &[TagId]) -> Vec<i64> {
        let wanted: HashSet<TagId> = tag_ids.iter().copied().collect();
        if wanted.is_empty() {
            return Vec::new();
        }
        self.matches(kind, &wanted)
            .into_iter()
            .filter(|(_, found)| found.len() == wanted.len())
            .map(|(id, _)| id)
            .collect()
    }

    fn counted(&self, counts: BTreeMap<TagId, BTreeSet<i64>>, min_count: Option<i64>) -> Vec<TagUsage> {
        let mut usage: Vec<TagUsage> = counts
            .into_iter()
            .filter_map(|(tag_id, entities)| {
                let count = entities.len() as i64;
                if min_count.is_some_and(|min| count < min) {
                    return None;
                }
                self.tags.get(&tag_id).map(|tag| TagUsage {
                    tag: tag.clone(),
                    count: Some(count),
                })
            })
            .collect();
        usage.sort_by(|a, b| a.tag.name.cmp(&b.tag.name));
        usage
    }
}

/// In-memory implementation of the tagging repositories.
///
/// Cloning yields a handle to the same underlying state.
#[derive(Debug, Clone, Default)]
pub struct MemoryTagStore {
    state: Arc<RwLock<State>>,
}

impl MemoryTagStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of links currently stored.
    pub async fn association_count(&self) -> usize {
        self.state.read().await.links.len()
    }
}

#[async_trait]
impl TagRepository for MemoryTagStore {
    async fn get_or_create(&self, name: &str) -> Result<(Tag, bool)> {
        Ok(self.state.write().await.get_or_create(name))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let state = self.state.read().await;
        Ok(state
            .by_name
            .get(name)
            .and_then(|id| state.tags.get(id))
            .cloned())
    }

    async fn find_by_names(&self, names: &[String]) -> Result<Vec<Tag>> {
        let state = self.state.read().await;
        let ids: BTreeSet<TagId> = names
            .iter()
            .filter_map(|name| state.by_name.get(name).copied())
            .collect();
        Ok(state.sorted_by_name(ids))
    }

    async fn find_by_id(&self, id: TagId) -> Result<Option<Tag>> {
        Ok(self.state.read().await.tags.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[TagId]) -> Result<Vec<Tag>> {
        let state = self.state.read().await;
        let ids: BTreeSet<TagId> = ids.iter().copied().collect();
        Ok(state.sorted_by_name(ids))
    }

    async fn list(&self) -> Result<Vec<Tag>> {
        let state = self.state.read().await;
        Ok(state.sorted_by_name(state.tags.keys().copied()))
    }

    async fn delete(&self, id: TagId) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(tag) = state.tags.remove(&id) else {
            return Ok(false);
        };
        state.by_name.remove(&tag.name);
        state.links.retain(|(_, tag_id)| *tag_id != id);
        debug!(
            subsystem = "tagging",
            component = "memory_store",
            op = "delete_tag",
            tag_id = id,
            tag_name = %tag.name,
            "Deleted tag and its associations"
        );
        Ok(true)
    }
}

#[async_trait]
impl AssociationRepository for MemoryTagStore {
    async fn link(&self, tag_id: TagId, entity: &EntityRef) -> Result<bool> {
        let mut state = self.state.write().await;
        if !state.tags.contains_key(&tag_id) {
            return Err(Error::NotFound(format!("tag {}", tag_id)));
        }
        Ok(state.links.insert((entity.clone(), tag_id)))
    }

    async fn unlink(&self, tag_id: TagId, entity: &EntityRef) -> Result<bool> {
        Ok(self
            .state
            .write()
            .await
            .links
            .remove(&(entity.clone(), tag_id)))
    }

    async fn unlink_all(&self, entity: &EntityRef) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.links.len();
        state.links.retain(|(e, _)| e != entity);
        Ok((before - state.links.len()) as u64)
    }

    async fn for_entity(&self, entity: &EntityRef) -> Result<Vec<Tag>> {
        Ok(self.state.read().await.tags_of(entity))
    }

    async fn for_tag(&self, tag_id: TagId, kind: &str) -> Result<Vec<EntityRef>> {
        let state = self.state.read().await;
        let mut entities: Vec<EntityRef> = state
            .links
            .iter()
            .filter(|(e, id)| *id == tag_id && e.kind == kind)
            .map(|(e, _)| e.clone())
            .collect();
        entities.sort();
        Ok(entities)
    }

    async fn replace_tags(&self, entity: &EntityRef, names: &[String]) -> Result<TagDiff> {
        let mut state = self.state.write().await;
        let current = state.tags_of(entity);
        let diff = TagDiff::compute(&current, names);

        for tag in &diff.removed {
            state.links.remove(&(entity.clone(), tag.id));
        }
        for name in &diff.added {
            let (tag, _) = state.get_or_create(name);
            trace!(entity_kind = %entity.kind, entity_id = entity.id, tag_name = %tag.name, "Linking tag");
            state.links.insert((entity.clone(), tag.id));
        }
        Ok(diff)
    }
}

#[async_trait]
impl TagQueryRepository for MemoryTagStore {
    async fn entities_with_all(&self, kind: &str, tag_ids: &[TagId]) -> Result<Vec<EntityRef>> {
        let state = self.state.read().await;
        Ok(state
            .with_all(kind, tag_ids)
            .into_iter()
            .map(|id| EntityRef::new(kind, id))
            .collect())
    }

    async fn entities_with_any(&self, kind: &str, tag_ids: &[TagId]) -> Result<Vec<EntityRef>> {
        let state = self.state.read().await;
        let wanted: HashSet<TagId> = tag_ids.iter().copied().collect();
        Ok(state
            .matches(kind, &wanted)
            .into_keys()
            .map(|id| EntityRef::new(kind, id))
            .collect())
    }

    async fn usage_for_kind(
        &self,
        kind: &str,
        filter: Option<&UsageFilter>,
        min_count: Option<i64>,
    ) -> Result<Vec<TagUsage>> {
        let allowed: Option<HashSet<i64>> = match filter {
            None => None,
            Some(UsageFilter::Entities(ids)) => Some(ids.iter().copied().collect()),
            Some(UsageFilter::Sql(_)) => {
                return Err(Error::InvalidInput(
                    "SQL usage filters require a SQL-backed store".to_string(),
                ))
            }
        };

        let state = self.state.read().await;
        let mut counts: BTreeMap<TagId, BTreeSet<i64>> = BTreeMap::new();
        for (entity, tag_id) in &state.links {
            if entity.kind != kind {
                continue;
            }
            if allowed.as_ref().is_some_and(|ids| !ids.contains(&entity.id)) {
                continue;
            }
            counts.entry(*tag_id).or_default().insert(entity.id);
        }
        Ok(state.counted(counts, min_count))
    }

    async fn related_tags(
        &self,
        tag_ids: &[TagId],
        kind: &str,
        min_count: Option<i64>,
    ) -> Result<Vec<TagUsage>> {
        let state = self.state.read().await;
        let seeds: HashSet<TagId> = tag_ids.iter().copied().collect();
        let matched: HashSet<i64> = state.with_all(kind, tag_ids).into_iter().collect();

        let mut counts: BTreeMap<TagId, BTreeSet<i64>> = BTreeMap::new();
        for (entity, tag_id) in &state.links {
            if entity.kind == kind && matched.contains(&entity.id) && !seeds.contains(tag_id) {
                counts.entry(*tag_id).or_default().insert(entity.id);
            }
        }
        Ok(state.counted(counts, min_count))
    }

    async fn related_entities(
        &self,
        entity: &EntityRef,
        kind: &str,
        limit: Option<usize>,
    ) -> Result<Vec<RelatedEntity>> {
        let state = self.state.read().await;
        let source: HashSet<TagId> = state
            .links
            .iter()
            .filter(|(e, _)| e == entity)
            .map(|(_, id)| *id)
            .collect();

        let mut shared: BTreeMap<i64, i64> = BTreeMap::new();
        for (other, tag_id) in &state.links {
            if other.kind == kind && other != entity && source.contains(tag_id) {
                *shared.entry(other.id).or_default() += 1;
            }
        }

        let mut related: Vec<RelatedEntity> = shared
            .into_iter()
            .map(|(id, shared_tags)| RelatedEntity {
                entity: EntityRef::new(kind, id),
                shared_tags,
            })
            .collect();
        related.sort_by(|a, b| {
            b.shared_tags
                .cmp(&a.shared_tags)
                .then_with(|| a.entity.id.cmp(&b.entity.id))
        });
        if let Some(limit) = limit {
            related.truncate(limit);
        }
        Ok(related)
    }
}
