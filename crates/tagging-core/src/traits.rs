//! Core traits for the tagging engine.
//!
//! These traits define the storage interfaces a backend must satisfy,
//! enabling pluggable stores (PostgreSQL, in-memory) behind one service.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// TAG REPOSITORY
// =============================================================================

/// Repository for tag rows.
///
/// Names reaching this trait are already normalized and validated.
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Fetch the tag with this exact name, creating it if missing.
    ///
    /// Returns the tag and whether this call created it. Concurrent
    /// creation of one name must never produce two rows.
    async fn get_or_create(&self, name: &str) -> Result<(Tag, bool)>;

    /// Get a tag by exact name.
    async fn find_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// Get the tags matching these names, ordered by name. Missing names
    /// are skipped.
    async fn find_by_names(&self, names: &[String]) -> Result<Vec<Tag>>;

    /// Get a tag by id.
    async fn find_by_id(&self, id: TagId) -> Result<Option<Tag>>;

    /// Get the tags matching these ids, ordered by name. Missing ids are
    /// skipped.
    async fn find_by_ids(&self, ids: &[TagId]) -> Result<Vec<Tag>>;

    /// List all tags ordered by name.
    async fn list(&self) -> Result<Vec<Tag>>;

    /// Delete a tag together with all of its associations.
    ///
    /// Returns false when no tag had this id.
    async fn delete(&self, id: TagId) -> Result<bool>;
}

// =============================================================================
// ASSOCIATION REPOSITORY
// =============================================================================

/// Repository for (tag, entity) links.
#[async_trait]
pub trait AssociationRepository: Send + Sync {
    /// Link a tag to an entity. Linking an existing pair is a no-op.
    ///
    /// Returns whether a new link was created.
    async fn link(&self, tag_id: TagId, entity: &EntityRef) -> Result<bool>;

    /// Remove one link. Returns whether it existed.
    async fn unlink(&self, tag_id: TagId, entity: &EntityRef) -> Result<bool>;

    /// Remove every link of an entity. Tag rows are left in place.
    async fn unlink_all(&self, entity: &EntityRef) -> Result<u64>;

    /// Tags linked to an entity, ordered by name.
    async fn for_entity(&self, entity: &EntityRef) -> Result<Vec<Tag>>;

    /// Entities of one kind linked to a tag, ordered by instance id.
    async fn for_tag(&self, tag_id: TagId, kind: &str) -> Result<Vec<EntityRef>>;

    /// Make the entity's tag set exactly `names`.
    ///
    /// Computes a [`TagDiff`] against the current links, creates missing
    /// tags, and applies the diff atomically: readers observe either the
    /// whole prior set or the whole new set. Concurrent calls for the same
    /// entity are serialized. Returns the applied diff.
    async fn replace_tags(&self, entity: &EntityRef, names: &[String]) -> Result<TagDiff>;
}

// =============================================================================
// QUERY REPOSITORY
// =============================================================================

/// Set-algebra queries over the tag/entity association.
#[async_trait]
pub trait TagQueryRepository: Send + Sync {
    /// Entities of `kind` linked to every tag in `tag_ids`, by instance id.
    async fn entities_with_all(&self, kind: &str, tag_ids: &[TagId]) -> Result<Vec<EntityRef>>;

    /// Entities of `kind` linked to any tag in `tag_ids`, by instance id.
    async fn entities_with_any(&self, kind: &str, tag_ids: &[TagId]) -> Result<Vec<EntityRef>>;

    /// Tags used by entities of `kind` with the number of distinct
    /// entities using each, ordered by name.
    async fn usage_for_kind(
        &self,
        kind: &str,
        filter: Option<&UsageFilter>,
        min_count: Option<i64>,
    ) -> Result<Vec<TagUsage>>;

    /// Tags co-occurring with all of `tag_ids` on entities of `kind`,
    /// excluding `tag_ids` themselves, ordered by name. Counts are the
    /// number of co-occurring entities.
    async fn related_tags(
        &self,
        tag_ids: &[TagId],
        kind: &str,
        min_count: Option<i64>,
    ) -> Result<Vec<TagUsage>>;

    /// Entities of `kind` sharing at least one tag with `entity`, most
    /// shared tags first, then by instance id. The entity itself is
    /// excluded. `limit` applies after ordering.
    async fn related_entities(
        &self,
        entity: &EntityRef,
        kind: &str,
        limit: Option<usize>,
    ) -> Result<Vec<RelatedEntity>>;
}

/// A complete tagging backend.
pub trait TagStorage: TagRepository + AssociationRepository + TagQueryRepository {}

impl<T> TagStorage for T where T: TagRepository + AssociationRepository + TagQueryRepository {}

// =============================================================================
// HOST ENTITIES
// =============================================================================

/// Resolution of a host entity handle to its entity reference.
pub trait Taggable {
    /// Kind identifier of the entity.
    fn entity_kind(&self) -> &str;

    /// Durable instance id, or `None` while the entity is not yet persisted.
    fn entity_id(&self) -> Option<i64>;

    fn entity_ref(&self) -> Option<EntityRef> {
        self.entity_id()
            .map(|id| EntityRef::new(self.entity_kind(), id))
    }
}

impl Taggable for EntityRef {
    fn entity_kind(&self) -> &str {
        &self.kind
    }

    fn entity_id(&self) -> Option<i64> {
        Some(self.id)
    }
}
