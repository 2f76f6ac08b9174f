//! Structured logging schema and field name constants for the tagging engine.
//!
//! Both crates use these constants for consistent structured logging fields,
//! so log aggregation can query every subsystem by the same field names.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic retry or fallback applied |
//! | INFO  | Lifecycle events (pool creation, migrations) |
//! | DEBUG | Mutations and decision points (tag created, diff applied) |
//! | TRACE | Per-row detail (individual links, query rows) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "tagging", "database"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "engine", "registry", "memory_store", "pg_store", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "update_tags", "get_or_create", "related_entities"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Host entity kind (the first half of an entity reference).
pub const ENTITY_KIND: &str = "entity_kind";

/// Host entity instance id (the second half of an entity reference).
pub const ENTITY_ID: &str = "entity_id";

/// Tag name being operated on.
pub const TAG_NAME: &str = "tag_name";

/// Tag surrogate id being operated on.
pub const TAG_ID: &str = "tag_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of rows or items returned by a query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of associations added by a reconciliation.
pub const ADDED: &str = "added";

/// Number of associations removed by a reconciliation.
pub const REMOVED: &str = "removed";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_field_names_are_unique() {
        let fields = [
            SUBSYSTEM,
            COMPONENT,
            OPERATION,
            ENTITY_KIND,
            ENTITY_ID,
            TAG_NAME,
            TAG_ID,
            DURATION_MS,
            RESULT_COUNT,
            ADDED,
            REMOVED,
            POOL_SIZE,
            POOL_IDLE,
            ERROR_MSG,
        ];
        let unique: HashSet<&str> = fields.iter().copied().collect();
        assert_eq!(unique.len(), fields.len());
    }
}
