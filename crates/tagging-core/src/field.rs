//! Tag string attribute for host entities.
//!
//! [`TaggedEntity`] pairs a host entity with a pending tag string. Writing
//! tags to an entity that has no durable id yet caches the string; the
//! host calls [`Tagging::flush_pending`] after persisting the entity to
//! apply it.

use crate::error::Result;
use crate::models::TagDiff;
use crate::traits::{TagStorage, Taggable};
use crate::Tagging;

/// A host entity carrying an optional pending tag string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEntity<T> {
    entity: T,
    pending_tags: Option<String>,
}

impl<T: Taggable> TaggedEntity<T> {
    pub fn new(entity: T) -> Self {
        Self {
            entity,
            pending_tags: None,
        }
    }

    pub fn entity(&self) -> &T {
        &self.entity
    }

    /// Mutable access, e.g. to assign the durable id after saving.
    pub fn entity_mut(&mut self) -> &mut T {
        &mut self.entity
    }

    /// Tag string waiting for the entity to be persisted.
    pub fn pending_tags(&self) -> Option<&str> {
        self.pending_tags.as_deref()
    }

    pub fn into_inner(self) -> T {
        self.entity
    }
}

impl<S: TagStorage> Tagging<S> {
    /// Current tags of the entity as an editable string.
    ///
    /// A pending value wins over stored tags. An entity without a durable
    /// id and without a pending value has no tags.
    pub async fn get_tags<T: Taggable>(&self, tagged: &TaggedEntity<T>) -> Result<String> {
        if let Some(pending) = tagged.pending_tags() {
            let mut names = self.parse(Some(pending));
            names.sort();
            return Ok(self.render(&names));
        }
        match tagged.entity().entity_ref() {
            Some(entity) => {
                let names: Vec<String> = self
                    .tags_for(&entity)
                    .await?
                    .into_iter()
                    .map(|t| t.name)
                    .collect();
                Ok(self.render(&names))
            }
            None => Ok(String::new()),
        }
    }

    /// Assign the entity's tags from a raw string.
    ///
    /// Names are validated immediately. Persisted entities are updated
    /// right away; others keep the string until [`Self::flush_pending`].
    pub async fn set_tags<T: Taggable>(
        &self,
        tagged: &mut TaggedEntity<T>,
        input: Option<&str>,
    ) -> Result<Option<TagDiff>> {
        self.ensure_kind(tagged.entity().entity_kind())?;
        self.parse_validated(input)?;
        match tagged.entity().entity_ref() {
            Some(entity) => {
                tagged.pending_tags = None;
                self.update_tags(&entity, input).await.map(Some)
            }
            None => {
                tagged.pending_tags = Some(input.unwrap_or_default().to_string());
                Ok(None)
            }
        }
    }

    /// Remove every tag from the entity, pending or stored.
    pub async fn clear_tags<T: Taggable>(
        &self,
        tagged: &mut TaggedEntity<T>,
    ) -> Result<Option<TagDiff>> {
        self.set_tags(tagged, None).await
    }

    /// Apply a pending tag string once the entity has a durable id.
    ///
    /// Returns `None` when nothing was pending or the entity is still
    /// unsaved; the pending value is kept in the latter case.
    pub async fn flush_pending<T: Taggable>(
        &self,
        tagged: &mut TaggedEntity<T>,
    ) -> Result<Option<TagDiff>> {
        let Some(entity) = tagged.entity().entity_ref() else {
            return Ok(None);
        };
        let Some(pending) = tagged.pending_tags.take() else {
            return Ok(None);
        };
        match self.update_tags(&entity, Some(&pending)).await {
            Ok(diff) => Ok(Some(diff)),
            Err(e) => {
                tagged.pending_tags = Some(pending);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TaggingConfig;
    use crate::error::Error;
    use crate::memory::MemoryTagStore;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Article {
        id: Option<i64>,
    }

    impl Taggable for Article {
        fn entity_kind(&self) -> &str {
            "article"
        }

        fn entity_id(&self) -> Option<i64> {
            self.id
        }
    }

    fn engine() -> Tagging<MemoryTagStore> {
        Tagging::new(MemoryTagStore::new(), TaggingConfig::default())
            .unwrap()
            .with_kind("article")
            .unwrap()
    }

    #[tokio::test]
    async fn test_unsaved_entity_caches_tags() {
        let tagging = engine();
        let mut article = TaggedEntity::new(Article { id: None });

        assert_eq!(tagging.get_tags(&article).await.unwrap(), "");
        let diff = tagging.set_tags(&mut article, Some("foo, bar")).await.unwrap();
        assert!(diff.is_none());
        assert_eq!(article.pending_tags(), Some("foo, bar"));
        assert_eq!(tagging.get_tags(&article).await.unwrap(), "bar, foo");
        assert!(tagging.list_tags().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsaved_entity_of_unknown_kind_is_rejected() {
        let tagging = Tagging::new(MemoryTagStore::new(), TaggingConfig::default()).unwrap();
        let mut article = TaggedEntity::new(Article { id: None });

        let err = tagging
            .set_tags(&mut article, Some("foo"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownModelKind(_)));
        assert!(article.pending_tags().is_none());
    }

    #[tokio::test]
    async fn test_flush_after_save() {
        let tagging = engine();
        let mut article = TaggedEntity::new(Article { id: None });
        tagging.set_tags(&mut article, Some("foo bar")).await.unwrap();

        assert!(tagging.flush_pending(&mut article).await.unwrap().is_none());
        article.entity_mut().id = Some(7);
        let diff = tagging.flush_pending(&mut article).await.unwrap().unwrap();
        assert_eq!(diff.added.len(), 2);
        assert!(article.pending_tags().is_none());
        assert_eq!(tagging.get_tags(&article).await.unwrap(), "bar, foo");
    }

    #[tokio::test]
    async fn test_saved_entity_writes_through() {
        let tagging = engine();
        let mut article = TaggedEntity::new(Article { id: Some(1) });
        tagging.set_tags(&mut article, Some("toast cheese")).await.unwrap();
        assert!(article.pending_tags().is_none());
        assert_eq!(tagging.get_tags(&article).await.unwrap(), "cheese, toast");

        tagging.clear_tags(&mut article).await.unwrap();
        assert_eq!(tagging.get_tags(&article).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_invalid_names_rejected_before_caching() {
        let tagging = engine();
        let mut article = TaggedEntity::new(Article { id: None });
        assert!(tagging.set_tags(&mut article, Some("bad!")).await.is_err());
        assert!(article.pending_tags().is_none());
    }
}
