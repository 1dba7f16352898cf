//! Repository for the `audit_events` table (append-only).

use sqlx::PgPool;

use drawbridge_core::types::DbId;

use crate::models::audit_event::AuditEvent;

const COLUMNS: &str = "\
    id, actor_kind, actor_id, event_type, request_id, git_session_id, \
    metadata, created_at";

/// Provides insert and listing operations for the audit trail.
/// There is deliberately no update or delete.
pub struct AuditRepo;

impl AuditRepo {
    /// Append an audit event.
    pub async fn insert(
        pool: &PgPool,
        actor_kind: &str,
        actor_id: Option<&str>,
        event_type: &str,
        request_id: Option<DbId>,
        git_session_id: Option<DbId>,
        metadata: serde_json::Value,
    ) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO audit_events
                (actor_kind, actor_id, event_type, request_id, git_session_id, metadata)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(actor_kind)
        .bind(actor_id)
        .bind(event_type)
        .bind(request_id)
        .bind(git_session_id)
        .bind(metadata)
        .fetch_one(pool)
        .await
    }

    /// List the trail for a brokered request, oldest first.
    pub async fn list_for_request(
        pool: &PgPool,
        request_id: DbId,
    ) -> Result<Vec<AuditEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audit_events
             WHERE request_id = $1 ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, AuditEvent>(&query)
            .bind(request_id)
            .fetch_all(pool)
            .await
    }

    /// List the trail for a Git session, oldest first.
    pub async fn list_for_session(
        pool: &PgPool,
        git_session_id: DbId,
    ) -> Result<Vec<AuditEvent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audit_events
             WHERE git_session_id = $1 ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, AuditEvent>(&query)
            .bind(git_session_id)
            .fetch_all(pool)
            .await
    }
}
