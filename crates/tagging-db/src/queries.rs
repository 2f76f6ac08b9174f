//! Set-algebra queries over tags and tagged entities.

use std::collections::BTreeSet;
use std::time::Instant;

use async_trait::async_trait;
use sqlx::{FromRow, Row};
use tracing::debug;

use tagging_core::{
    EntityRef, Error, RelatedEntity, Result, Tag, TagId, TagQueryRepository, TagUsage, UsageFilter,
};

use crate::tags::{PgTaggingRepository, TAG_COLUMNS};
use crate::usage_filter::{bind_params, filter_clause};

/// A tag row with its usage count.
#[derive(Debug, FromRow)]
struct UsageRow {
    id: TagId,
    name: String,
    created_at_utc: chrono::DateTime<chrono::Utc>,
    count: i64,
}

impl From<UsageRow> for TagUsage {
    fn from(row: UsageRow) -> Self {
        TagUsage {
            tag: Tag {
                id: row.id,
                name: row.name,
                created_at_utc: row.created_at_utc,
            },
            count: Some(row.count),
        }
    }
}

fn distinct(tag_ids: &[TagId]) -> Vec<TagId> {
    tag_ids
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn to_entities(kind: &str, rows: Vec<sqlx::postgres::PgRow>) -> Vec<EntityRef> {
    rows.into_iter()
        .map(|row| EntityRef::new(kind, row.get::<i64, _>("entity_id")))
        .collect()
}

#[async_trait]
impl TagQueryRepository for PgTaggingRepository {
    async fn entities_with_all(&self, kind: &str, tag_ids: &[TagId]) -> Result<Vec<EntityRef>> {
        let ids = distinct(tag_ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT entity_id FROM tagged_item
             WHERE entity_kind = $1 AND tag_id = ANY($2)
             GROUP BY entity_id
             HAVING COUNT(DISTINCT tag_id) = $3
             ORDER BY entity_id",
        )
        .bind(kind)
        .bind(&ids)
        .bind(ids.len() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(to_entities(kind, rows))
    }

    async fn entities_with_any(&self, kind: &str, tag_ids: &[TagId]) -> Result<Vec<EntityRef>> {
        let ids = distinct(tag_ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            "SELECT DISTINCT entity_id FROM tagged_item
             WHERE entity_kind = $1 AND tag_id = ANY($2)
             ORDER BY entity_id",
        )
        .bind(kind)
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(to_entities(kind, rows))
    }

    async fn usage_for_kind(
        &self,
        kind: &str,
        filter: Option<&UsageFilter>,
        min_count: Option<i64>,
    ) -> Result<Vec<TagUsage>> {
        let start = Instant::now();

        // $1 is the kind; filter params follow, min_count comes last.
        let (filter_sql, filter_params) = filter_clause(filter, 1)?;
        let min_count_idx = filter_params.len() + 2;

        let sql = format!(
            r#"
            SELECT {columns}, COUNT(DISTINCT ti.entity_id) AS count
            FROM tag t
            JOIN tagged_item ti ON ti.tag_id = t.id
            WHERE ti.entity_kind = $1
              {filter}
            GROUP BY t.id, t.name, t.created_at_utc
            HAVING (${min}::bigint IS NULL OR COUNT(DISTINCT ti.entity_id) >= ${min})
            ORDER BY t.name
            "#,
            columns = TAG_COLUMNS,
            filter = filter_sql,
            min = min_count_idx,
        );

        let mut q = sqlx::query_as::<_, UsageRow>(&sql).bind(kind);
        q = bind_params(q, &filter_params);
        q = q.bind(min_count);

        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;

        debug!(
            subsystem = "tagging",
            component = "pg_store",
            op = "usage_for_kind",
            entity_kind = %kind,
            result_count = rows.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Computed tag usage"
        );
        Ok(rows.into_iter().map(TagUsage::from).collect())
    }

    async fn related_tags(
        &self,
        tag_ids: &[TagId],
        kind: &str,
        min_count: Option<i64>,
    ) -> Result<Vec<TagUsage>> {
        let ids = distinct(tag_ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            r#"
            WITH matched AS (
                SELECT entity_id FROM tagged_item
                WHERE entity_kind = $1 AND tag_id = ANY($2)
                GROUP BY entity_id
                HAVING COUNT(DISTINCT tag_id) = $3
            )
            SELECT {}, COUNT(DISTINCT ti.entity_id) AS count
            FROM tagged_item ti
            JOIN matched m ON m.entity_id = ti.entity_id
            JOIN tag t ON t.id = ti.tag_id
            WHERE ti.entity_kind = $1
              AND NOT (ti.tag_id = ANY($2))
            GROUP BY t.id, t.name, t.created_at_utc
            HAVING ($4::bigint IS NULL OR COUNT(DISTINCT ti.entity_id) >= $4)
            ORDER BY t.name
            "#,
            TAG_COLUMNS
        );
        let rows = sqlx::query_as::<_, UsageRow>(&sql)
            .bind(kind)
            .bind(&ids)
            .bind(ids.len() as i64)
            .bind(min_count)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(rows.into_iter().map(TagUsage::from).collect())
    }

    async fn related_entities(
        &self,
        entity: &EntityRef,
        kind: &str,
        limit: Option<usize>,
    ) -> Result<Vec<RelatedEntity>> {
        let rows = sqlx::query(
            r#"
            SELECT other.entity_id, COUNT(*) AS shared_tags
            FROM tagged_item src
            JOIN tagged_item other ON other.tag_id = src.tag_id
            WHERE src.entity_kind = $1 AND src.entity_id = $2
              AND other.entity_kind = $3
              AND NOT (other.entity_kind = $1 AND other.entity_id = $2)
            GROUP BY other.entity_id
            ORDER BY shared_tags DESC, other.entity_id
            LIMIT $4
            "#,
        )
        .bind(&entity.kind)
        .bind(entity.id)
        .bind(kind)
        .bind(limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| RelatedEntity {
                entity: EntityRef::new(kind, row.get::<i64, _>("entity_id")),
                shared_tags: row.get("shared_tags"),
            })
            .collect())
    }
}
