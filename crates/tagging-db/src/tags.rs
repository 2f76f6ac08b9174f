//! Tag repository implementation.

use async_trait::async_trait;
use sqlx::{PgConnection, Pool, Postgres};
use tracing::{debug, warn};

use tagging_core::defaults::GET_OR_CREATE_ATTEMPTS;
use tagging_core::{Error, Result, Tag, TagId, TagRepository};

pub(crate) const TAG_COLUMNS: &str = "t.id, t.name, t.created_at_utc";

/// PostgreSQL implementation of the tagging repositories.
///
/// One struct serves tags, associations and queries; see
/// `associations.rs` and `queries.rs` for the other trait impls.
#[derive(Debug, Clone)]
pub struct PgTaggingRepository {
    pub(crate) pool: Pool<Postgres>,
}

impl PgTaggingRepository {
    /// Create a new PgTaggingRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

/// Fetch or create a tag on one connection.
///
/// The insert skips on a name conflict and the follow-up select picks up
/// the committed row. A row deleted between the two statements triggers
/// another attempt.
pub(crate) async fn get_or_create_on(conn: &mut PgConnection, name: &str) -> Result<(Tag, bool)> {
    for attempt in 1..=GET_OR_CREATE_ATTEMPTS {
        let inserted = sqlx::query_as::<_, Tag>(
            "INSERT INTO tag (name) VALUES ($1)
             ON CONFLICT (name) DO NOTHING
             RETURNING id, name, created_at_utc",
        )
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(Error::Database)?;

        if let Some(tag) = inserted {
            debug!(
                subsystem = "tagging",
                component = "pg_store",
                op = "get_or_create",
                tag_id = tag.id,
                tag_name = %tag.name,
                "Created tag"
            );
            return Ok((tag, true));
        }

        let existing = sqlx::query_as::<_, Tag>(
            "SELECT id, name, created_at_utc FROM tag WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(Error::Database)?;

        if let Some(tag) = existing {
            return Ok((tag, false));
        }

        warn!(
            subsystem = "tagging",
            component = "pg_store",
            op = "get_or_create",
            tag_name = %name,
            attempt,
            "Conflicting tag disappeared before it could be read, retrying"
        );
    }

    Err(Error::Conflict(format!(
        "tag {} could not be created or loaded",
        name
    )))
}

/// Fetch or create every tag in `names` on one connection, sorted by name.
///
/// Rows are inserted in name order within a single statement, so two
/// transactions creating overlapping sets wait on each other instead of
/// deadlocking.
pub(crate) async fn get_or_create_all_on(
    conn: &mut PgConnection,
    names: &[String],
) -> Result<Vec<Tag>> {
    let mut wanted: Vec<String> = names.to_vec();
    wanted.sort();
    wanted.dedup();
    if wanted.is_empty() {
        return Ok(Vec::new());
    }

    for attempt in 1..=GET_OR_CREATE_ATTEMPTS {
        let created = sqlx::query(
            "INSERT INTO tag (name)
             SELECT n FROM unnest($1::text[]) AS u(n) ORDER BY n
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(&wanted)
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;

        let tags = sqlx::query_as::<_, Tag>(
            "SELECT id, name, created_at_utc FROM tag WHERE name = ANY($1) ORDER BY name",
        )
        .bind(&wanted)
        .fetch_all(&mut *conn)
        .await
        .map_err(Error::Database)?;

        if tags.len() == wanted.len() {
            debug!(
                subsystem = "tagging",
                component = "pg_store",
                op = "get_or_create_all",
                requested = wanted.len(),
                created = created.rows_affected(),
                "Resolved tags"
            );
            return Ok(tags);
        }

        warn!(
            subsystem = "tagging",
            component = "pg_store",
            op = "get_or_create_all",
            requested = wanted.len(),
            found = tags.len(),
            attempt,
            "Conflicting tags disappeared before they could be read, retrying"
        );
    }

    Err(Error::Conflict(format!(
        "tags {} could not be created or loaded",
        wanted.join(", ")
    )))
}

#[async_trait]
impl TagRepository for PgTaggingRepository {
    async fn get_or_create(&self, name: &str) -> Result<(Tag, bool)> {
        let mut conn = self.pool.acquire().await.map_err(Error::Database)?;
        get_or_create_on(&mut conn, name).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Tag>> {
        sqlx::query_as::<_, Tag>("SELECT id, name, created_at_utc FROM tag WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn find_by_names(&self, names: &[String]) -> Result<Vec<Tag>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, Tag>(
            "SELECT id, name, created_at_utc FROM tag WHERE name = ANY($1) ORDER BY name",
        )
        .bind(names)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn find_by_id(&self, id: TagId) -> Result<Option<Tag>> {
        sqlx::query_as::<_, Tag>("SELECT id, name, created_at_utc FROM tag WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn find_by_ids(&self, ids: &[TagId]) -> Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, Tag>(
            "SELECT id, name, created_at_utc FROM tag WHERE id = ANY($1) ORDER BY name",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)
    }

    async fn list(&self) -> Result<Vec<Tag>> {
        sqlx::query_as::<_, Tag>("SELECT id, name, created_at_utc FROM tag ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)
    }

    async fn delete(&self, id: TagId) -> Result<bool> {
        // tagged_item rows go with the tag (ON DELETE CASCADE).
        let result = sqlx::query("DELETE FROM tag WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
