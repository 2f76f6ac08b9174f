//! The tagging engine facade.
//!
//! [`Tagging`] owns a storage backend, the engine configuration and the
//! registry of taggable kinds. Every public operation of the engine goes
//! through it: string parsing and rendering, tag lookup, reconciliation of
//! an entity's tag set, and the set-algebra queries.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info, instrument};

use crate::cloud::{calculate_cloud, CloudTag, Distribution};
use crate::config::TaggingConfig;
use crate::error::{Error, Result};
use crate::models::*;
use crate::parser::{
    normalize_names, parse_tag_input_with, render_tags_with, validate_single_tag,
    validate_tag_name,
};
use crate::traits::TagStorage;

/// Tagging engine over a storage backend.
#[derive(Debug, Clone)]
pub struct Tagging<S> {
    store: S,
    config: TaggingConfig,
    kinds: HashSet<String>,
}

impl<S: TagStorage> Tagging<S> {
    /// Create an engine. Fails when the configuration is invalid.
    pub fn new(store: S, config: TaggingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            config,
            kinds: HashSet::new(),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &TaggingConfig {
        &self.config
    }

    // =========================================================================
    // KIND REGISTRY
    // =========================================================================

    /// Enable tagging for an entity kind.
    ///
    /// Registering a kind twice is an error.
    pub fn register_kind(&mut self, kind: impl Into<String>) -> Result<()> {
        let kind = kind.into();
        if kind.trim().is_empty() {
            return Err(Error::InvalidInput("entity kind must not be empty".to_string()));
        }
        if self.kinds.contains(&kind) {
            return Err(Error::AlreadyRegistered(kind));
        }
        info!(
            subsystem = "tagging",
            component = "registry",
            op = "register_kind",
            entity_kind = %kind,
            "Registered taggable kind"
        );
        self.kinds.insert(kind);
        Ok(())
    }

    /// Builder form of [`Self::register_kind`].
    pub fn with_kind(mut self, kind: impl Into<String>) -> Result<Self> {
        self.register_kind(kind)?;
        Ok(self)
    }

    pub fn is_registered(&self, kind: &str) -> bool {
        self.kinds.contains(kind)
    }

    /// Registered kinds in name order.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.kinds.iter().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub(crate) fn ensure_kind(&self, kind: &str) -> Result<()> {
        if self.is_registered(kind) {
            Ok(())
        } else {
            Err(Error::UnknownModelKind(kind.to_string()))
        }
    }

    // =========================================================================
    // PARSING
    // =========================================================================

    /// Parse a raw tag string into normalized, de-duplicated names.
    pub fn parse(&self, input: Option<&str>) -> Vec<String> {
        let names = parse_tag_input_with(input, self.config.forced_delimiter);
        normalize_names(names, self.config.force_lowercase)
    }

    /// Render tag names as a string [`Self::parse`] reads back unchanged.
    pub fn render<T: AsRef<str>>(&self, names: &[T]) -> String {
        render_tags_with(names, self.config.forced_delimiter)
    }

    /// Parse and validate every name, failing on the first invalid one.
    pub fn parse_validated(&self, input: Option<&str>) -> Result<Vec<String>> {
        let names = self.parse(input);
        for name in &names {
            self.validate_name(name)?;
        }
        Ok(names)
    }

    fn validate_name(&self, name: &str) -> Result<()> {
        validate_tag_name(name, self.config.max_tag_length).map_err(Error::InvalidName)
    }

    fn normalize(&self, name: &str) -> String {
        if self.config.force_lowercase {
            name.to_lowercase()
        } else {
            name.to_string()
        }
    }

    // =========================================================================
    // TAG STORE
    // =========================================================================

    /// Fetch a tag by name, creating it if it does not exist.
    ///
    /// Also returns whether this call created the tag.
    pub async fn get_or_create(&self, name: &str) -> Result<(Tag, bool)> {
        let name = self.normalize(name.trim());
        self.validate_name(&name)?;
        self.store.get_or_create(&name).await
    }

    pub async fn find_tag(&self, name: &str) -> Result<Option<Tag>> {
        self.store.find_by_name(&self.normalize(name)).await
    }

    pub async fn find_tag_by_id(&self, id: TagId) -> Result<Option<Tag>> {
        self.store.find_by_id(id).await
    }

    /// Tags named in a raw tag string. Unknown names are skipped.
    pub async fn find_tags(&self, input: &str) -> Result<Vec<Tag>> {
        let names = self.parse(Some(input));
        if names.is_empty() {
            return Ok(Vec::new());
        }
        self.store.find_by_names(&names).await
    }

    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        self.store.list().await
    }

    /// Delete a tag by name along with all of its associations.
    pub async fn delete_tag(&self, name: &str) -> Result<()> {
        let tag = self
            .find_tag(name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("tag {}", name)))?;
        self.delete_tag_by_id(tag.id).await
    }

    pub async fn delete_tag_by_id(&self, id: TagId) -> Result<()> {
        if !self.store.delete(id).await? {
            return Err(Error::NotFound(format!("tag {}", id)));
        }
        info!(
            subsystem = "tagging",
            component = "engine",
            op = "delete_tag",
            tag_id = id,
            "Deleted tag"
        );
        Ok(())
    }

    /// Resolve a selector to known tags, ordered by name.
    ///
    /// Names and ids without a matching tag are dropped.
    pub async fn resolve(&self, selector: &TagSelector) -> Result<Vec<Tag>> {
        match selector {
            TagSelector::ByName(names) => {
                let names = normalize_names(names.clone(), self.config.force_lowercase);
                if names.is_empty() {
                    return Ok(Vec::new());
                }
                self.store.find_by_names(&names).await
            }
            TagSelector::ById(ids) => {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                self.store.find_by_ids(ids).await
            }
            TagSelector::ByTag(tags) => {
                let ids: Vec<TagId> = tags.iter().map(|t| t.id).collect();
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                self.store.find_by_ids(&ids).await
            }
        }
    }

    // =========================================================================
    // UPDATE ENGINE
    // =========================================================================

    /// Make an entity's tags exactly those named in `input`.
    ///
    /// `None` or a blank string clears every tag. Validation happens
    /// before any write, so an invalid name leaves the entity untouched.
    #[instrument(skip(self, entity, input), fields(subsystem = "tagging", component = "engine", op = "update_tags", entity_kind = %entity.kind, entity_id = entity.id))]
    pub async fn update_tags(&self, entity: &EntityRef, input: Option<&str>) -> Result<TagDiff> {
        self.ensure_kind(&entity.kind)?;
        let start = Instant::now();
        let names = self.parse_validated(input)?;

        let diff = self.store.replace_tags(entity, &names).await?;

        debug!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Reconciled entity tags"
        );
        Ok(diff)
    }

    /// Link a single tag to an entity. Existing links are left alone.
    ///
    /// The name must be one tag: whitespace and commas are rejected.
    pub async fn add_tag(&self, entity: &EntityRef, name: &str) -> Result<Tag> {
        self.ensure_kind(&entity.kind)?;
        let name = self.normalize(name.trim());
        validate_single_tag(&name, self.config.max_tag_length).map_err(Error::InvalidName)?;

        let (tag, _) = self.store.get_or_create(&name).await?;
        if self.store.link(tag.id, entity).await? {
            debug!(
                subsystem = "tagging",
                component = "engine",
                op = "add_tag",
                entity_kind = %entity.kind,
                entity_id = entity.id,
                tag_name = %tag.name,
                "Linked tag"
            );
        }
        Ok(tag)
    }

    /// Unlink a single tag from an entity.
    ///
    /// Returns whether a link was removed. Unknown names are not an error.
    pub async fn remove_tag(&self, entity: &EntityRef, name: &str) -> Result<bool> {
        self.ensure_kind(&entity.kind)?;
        match self.find_tag(name.trim()).await? {
            Some(tag) => self.store.unlink(tag.id, entity).await,
            None => Ok(false),
        }
    }

    /// Tags linked to an entity, ordered by name.
    pub async fn tags_for(&self, entity: &EntityRef) -> Result<Vec<Tag>> {
        self.ensure_kind(&entity.kind)?;
        self.store.for_entity(entity).await
    }

    /// Drop every link of a deleted entity. Tags themselves survive.
    pub async fn entity_deleted(&self, entity: &EntityRef) -> Result<u64> {
        let removed = self.store.unlink_all(entity).await?;
        if removed > 0 {
            debug!(
                subsystem = "tagging",
                component = "engine",
                op = "entity_deleted",
                entity_kind = %entity.kind,
                entity_id = entity.id,
                removed,
                "Removed associations of deleted entity"
            );
        }
        Ok(removed)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Entities of `kind` tagged with the tag called `name`.
    pub async fn entities_for_tag(&self, name: &str, kind: &str) -> Result<Vec<EntityRef>> {
        self.ensure_kind(kind)?;
        match self.find_tag(name).await? {
            Some(tag) => self.store.for_tag(tag.id, kind).await,
            None => Ok(Vec::new()),
        }
    }

    /// Entities of `kind` carrying every selected tag.
    ///
    /// Only tags that exist take part; selecting nothing known matches
    /// nothing.
    pub async fn entities_with_all(
        &self,
        kind: &str,
        selector: &TagSelector,
    ) -> Result<Vec<EntityRef>> {
        self.ensure_kind(kind)?;
        let ids = self.resolved_ids(selector).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.store.entities_with_all(kind, &ids).await
    }

    /// Entities of `kind` carrying at least one selected tag.
    pub async fn entities_with_any(
        &self,
        kind: &str,
        selector: &TagSelector,
    ) -> Result<Vec<EntityRef>> {
        self.ensure_kind(kind)?;
        let ids = self.resolved_ids(selector).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.store.entities_with_any(kind, &ids).await
    }

    /// Tags used by entities of `kind`, ordered by name.
    pub async fn usage_for_kind(&self, kind: &str, query: &UsageQuery) -> Result<Vec<TagUsage>> {
        self.ensure_kind(kind)?;
        let usage = self
            .store
            .usage_for_kind(kind, query.filter.as_ref(), query.min_count)
            .await?;
        Ok(strip_counts(usage, query.wants_counts()))
    }

    /// Tags appearing on entities of `kind` that carry every selected tag.
    ///
    /// The selected tags themselves are excluded.
    pub async fn related_tags(
        &self,
        selector: &TagSelector,
        kind: &str,
        counts: bool,
        min_count: Option<i64>,
    ) -> Result<Vec<TagUsage>> {
        self.ensure_kind(kind)?;
        let ids = self.resolved_ids(selector).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let related = self.store.related_tags(&ids, kind, min_count).await?;
        Ok(strip_counts(related, counts || min_count.is_some()))
    }

    /// Entities of `kind` sharing tags with `entity`, most shared first.
    pub async fn related_entities(
        &self,
        entity: &EntityRef,
        kind: &str,
        limit: Option<usize>,
    ) -> Result<Vec<EntityRef>> {
        Ok(self
            .related_entities_scored(entity, kind, limit)
            .await?
            .into_iter()
            .map(|r| r.entity)
            .collect())
    }

    /// Like [`Self::related_entities`], keeping the shared tag counts.
    pub async fn related_entities_scored(
        &self,
        entity: &EntityRef,
        kind: &str,
        limit: Option<usize>,
    ) -> Result<Vec<RelatedEntity>> {
        self.ensure_kind(&entity.kind)?;
        self.ensure_kind(kind)?;
        if limit == Some(0) {
            return Ok(Vec::new());
        }
        self.store.related_entities(entity, kind, limit).await
    }

    /// Usage of `kind` annotated with cloud font sizes.
    pub async fn cloud_for_kind(
        &self,
        kind: &str,
        steps: u32,
        distribution: Distribution,
        query: &UsageQuery,
    ) -> Result<Vec<CloudTag>> {
        let query = query.clone().with_counts();
        let usage = self.usage_for_kind(kind, &query).await?;
        calculate_cloud(usage, steps, distribution)
    }

    async fn resolved_ids(&self, selector: &TagSelector) -> Result<Vec<TagId>> {
        let tags = self.resolve(selector).await?;
        if tags.is_empty() && !selector.is_empty() {
            debug!(
                subsystem = "tagging",
                component = "engine",
                op = "resolve",
                "No selected tag exists"
            );
        }
        Ok(tags.into_iter().map(|t| t.id).collect())
    }
}

fn strip_counts(mut usage: Vec<TagUsage>, keep: bool) -> Vec<TagUsage> {
    if !keep {
        for u in &mut usage {
            u.count = None;
        }
    }
    usage
}
