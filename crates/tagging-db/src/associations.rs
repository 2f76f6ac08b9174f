//! Association repository implementation.

use std::time::Instant;

use async_trait::async_trait;
use sqlx::{PgConnection, Row};
use tracing::{debug, trace};

use tagging_core::{AssociationRepository, EntityRef, Error, Result, Tag, TagDiff, TagId};

use crate::tags::{get_or_create_all_on, PgTaggingRepository, TAG_COLUMNS};

/// Turn a foreign key violation on `tagged_item.tag_id` into `NotFound`.
fn map_link_error(e: sqlx::Error, tag_id: TagId) -> Error {
    if let sqlx::Error::Database(db) = &e {
        if db.is_foreign_key_violation() {
            return Error::NotFound(format!("tag {}", tag_id));
        }
    }
    Error::Database(e)
}

async fn insert_link(conn: &mut PgConnection, tag_id: TagId, entity: &EntityRef) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO tagged_item (tag_id, entity_kind, entity_id) VALUES ($1, $2, $3)
         ON CONFLICT (tag_id, entity_kind, entity_id) DO NOTHING",
    )
    .bind(tag_id)
    .bind(&entity.kind)
    .bind(entity.id)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_link_error(e, tag_id))?;
    Ok(result.rows_affected() > 0)
}

async fn tags_of(conn: &mut PgConnection, entity: &EntityRef) -> Result<Vec<Tag>> {
    let sql = format!(
        "SELECT {} FROM tag t
         JOIN tagged_item ti ON ti.tag_id = t.id
         WHERE ti.entity_kind = $1 AND ti.entity_id = $2
         ORDER BY t.name",
        TAG_COLUMNS
    );
    sqlx::query_as::<_, Tag>(&sql)
        .bind(&entity.kind)
        .bind(entity.id)
        .fetch_all(&mut *conn)
        .await
        .map_err(Error::Database)
}

#[async_trait]
impl AssociationRepository for PgTaggingRepository {
    async fn link(&self, tag_id: TagId, entity: &EntityRef) -> Result<bool> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        insert_link(&mut conn, tag_id, entity).await
    }

    async fn unlink(&self, tag_id: TagId, entity: &EntityRef) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM tagged_item WHERE tag_id = $1 AND entity_kind = $2 AND entity_id = $3",
        )
        .bind(tag_id)
        .bind(&entity.kind)
        .bind(entity.id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn unlink_all(&self, entity: &EntityRef) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM tagged_item WHERE entity_kind = $1 AND entity_id = $2")
                .bind(&entity.kind)
                .bind(entity.id)
                .execute(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }

    async fn for_entity(&self, entity: &EntityRef) -> Result<Vec<Tag>> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        tags_of(&mut conn, entity).await
    }

    async fn for_tag(&self, tag_id: TagId, kind: &str) -> Result<Vec<EntityRef>> {
        let rows = sqlx::query(
            "SELECT entity_id FROM tagged_item
             WHERE tag_id = $1 AND entity_kind = $2
             ORDER BY entity_id",
        )
        .bind(tag_id)
        .bind(kind)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| EntityRef::new(kind, row.get::<i64, _>("entity_id")))
            .collect())
    }

    async fn replace_tags(&self, entity: &EntityRef, names: &[String]) -> Result<TagDiff> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        // Serialize writers of this entity until commit.
        sqlx::query(
            "SELECT pg_advisory_xact_lock(hashtextextended($1 || '/' || ($2::bigint)::text, 0))",
        )
        .bind(&entity.kind)
        .bind(entity.id)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let current = tags_of(&mut tx, entity).await?;
        let diff = TagDiff::compute(&current, names);

        if !diff.removed.is_empty() {
            sqlx::query(
                "DELETE FROM tagged_item
                 WHERE entity_kind = $1 AND entity_id = $2 AND tag_id = ANY($3)",
            )
            .bind(&entity.kind)
            .bind(entity.id)
            .bind(diff.removed_ids())
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        // Name order keeps lock acquisition consistent across entities.
        for tag in get_or_create_all_on(&mut tx, &diff.added).await? {
            trace!(entity_kind = %entity.kind, entity_id = entity.id, tag_name = %tag.name, "Linking tag");
            insert_link(&mut tx, tag.id, entity).await?;
        }

        tx.commit().await.map_err(Error::Database)?;

        debug!(
            subsystem = "tagging",
            component = "pg_store",
            op = "replace_tags",
            entity_kind = %entity.kind,
            entity_id = entity.id,
            added = diff.added.len(),
            removed = diff.removed.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Applied tag diff"
        );
        Ok(diff)
    }
}
