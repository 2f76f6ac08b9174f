//! Core data models for the tagging engine.
//!
//! These types are shared by both crates and represent the engine's
//! domain entities: tags, entity references, and the associations
//! linking them.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parser::parse_tag_input;

/// Stable surrogate key of a tag.
pub type TagId = i64;

// =============================================================================
// TAGS AND ENTITIES
// =============================================================================

/// A uniquely-named label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub created_at_utc: DateTime<Utc>,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Opaque reference to a taggable object owned by the host.
///
/// Ordering is by kind, then instance id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: String,
    pub id: i64,
}

impl EntityRef {
    pub fn new(kind: impl Into<String>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A single (tag, entity) link record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::FromRow)]
pub struct Association {
    pub tag_id: TagId,
    pub entity_kind: String,
    pub entity_id: i64,
}

impl Association {
    pub fn entity(&self) -> EntityRef {
        EntityRef::new(self.entity_kind.clone(), self.entity_id)
    }
}

// =============================================================================
// QUERY RESULTS
// =============================================================================

/// A tag with the number of distinct entities using it.
///
/// `count` is `None` when the caller did not ask for counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagUsage {
    pub tag: Tag,
    pub count: Option<i64>,
}

impl TagUsage {
    pub fn name(&self) -> &str {
        &self.tag.name
    }
}

/// An entity sharing tags with a reference entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub entity: EntityRef,
    /// Number of tags shared with the reference entity.
    pub shared_tags: i64,
}

// =============================================================================
// TAG INPUT
// =============================================================================

/// The ways callers may designate a set of tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagSelector {
    /// Tag names; names without a matching tag are ignored.
    ByName(Vec<String>),
    /// Tags already loaded by the caller.
    ByTag(Vec<Tag>),
    /// Tag surrogate ids; unknown ids are ignored.
    ById(Vec<TagId>),
}

impl TagSelector {
    /// Select tags by the names found in a raw tag string.
    pub fn parse(input: &str) -> Self {
        Self::ByName(parse_tag_input(Some(input)))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::ByName(names) => names.is_empty(),
            Self::ByTag(tags) => tags.is_empty(),
            Self::ById(ids) => ids.is_empty(),
        }
    }
}

impl From<Tag> for TagSelector {
    fn from(tag: Tag) -> Self {
        Self::ByTag(vec![tag])
    }
}

impl From<Vec<Tag>> for TagSelector {
    fn from(tags: Vec<Tag>) -> Self {
        Self::ByTag(tags)
    }
}

impl From<&str> for TagSelector {
    fn from(name: &str) -> Self {
        Self::ByName(vec![name.to_string()])
    }
}

impl From<Vec<&str>> for TagSelector {
    fn from(names: Vec<&str>) -> Self {
        Self::ByName(names.into_iter().map(String::from).collect())
    }
}

impl From<Vec<String>> for TagSelector {
    fn from(names: Vec<String>) -> Self {
        Self::ByName(names)
    }
}

impl From<Vec<TagId>> for TagSelector {
    fn from(ids: Vec<TagId>) -> Self {
        Self::ById(ids)
    }
}

// =============================================================================
// RECONCILIATION
// =============================================================================

/// Minimal change turning an entity's current tag set into a target set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDiff {
    /// Currently linked tags absent from the target.
    pub removed: Vec<Tag>,
    /// Target names not currently linked, in target order.
    pub added: Vec<String>,
}

impl TagDiff {
    /// Compare by name: `current` minus `target` is removed, `target`
    /// minus `current` is added.
    pub fn compute(current: &[Tag], target: &[String]) -> Self {
        let target_names: HashSet<&str> = target.iter().map(String::as_str).collect();
        let current_names: HashSet<&str> = current.iter().map(|t| t.name.as_str()).collect();

        let removed = current
            .iter()
            .filter(|t| !target_names.contains(t.name.as_str()))
            .cloned()
            .collect();

        let mut seen = HashSet::new();
        let added = target
            .iter()
            .filter(|name| !current_names.contains(name.as_str()))
            .filter(|name| seen.insert(name.as_str()))
            .cloned()
            .collect();

        Self { removed, added }
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }

    pub fn removed_ids(&self) -> Vec<TagId> {
        self.removed.iter().map(|t| t.id).collect()
    }
}

// =============================================================================
// USAGE FILTERS
// =============================================================================

/// Type-safe parameter binding for host-supplied SQL fragments.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    /// Integer parameter.
    Int(i64),
    /// Array of integers (for ANY operations).
    IntArray(Vec<i64>),
    /// Floating point parameter.
    Float(f64),
    /// Boolean parameter.
    Bool(bool),
    /// String parameter.
    String(String),
    /// Array of strings.
    StringArray(Vec<String>),
}

/// A WHERE-clause fragment restricting which tagged entities count.
///
/// The fragment may reference `ti.entity_id` (the tagged instance id) and
/// uses placeholders `$1..$n` relative to its own parameter list; the
/// store renumbers them when splicing the fragment into its query.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    pub clause: String,
    pub params: Vec<QueryParam>,
}

impl SqlFilter {
    pub fn new(clause: impl Into<String>, params: Vec<QueryParam>) -> Self {
        Self {
            clause: clause.into(),
            params,
        }
    }
}

/// Host-supplied restriction for usage queries.
#[derive(Debug, Clone, PartialEq)]
pub enum UsageFilter {
    /// Only count these instance ids (resolved by the host).
    Entities(Vec<i64>),
    /// Injected SQL fragment; only SQL-backed stores support it.
    Sql(SqlFilter),
}

/// Options for usage and cloud queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageQuery {
    /// Attach a count to every returned tag.
    pub counts: bool,
    /// Only return tags used at least this many times. Implies counts.
    pub min_count: Option<i64>,
    /// Restrict the entities that are counted.
    pub filter: Option<UsageFilter>,
}

impl UsageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counts(mut self) -> Self {
        self.counts = true;
        self
    }

    pub fn min_count(mut self, min_count: i64) -> Self {
        self.min_count = Some(min_count);
        self
    }

    pub fn filter(mut self, filter: UsageFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Whether counts end up in the result.
    pub fn wants_counts(&self) -> bool {
        self.counts || self.min_count.is_some()
    }
}
