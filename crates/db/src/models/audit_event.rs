//! Audit trail entity models.
//!
//! Audit events are append-only and immutable once created (no
//! `updated_at`). Metadata never contains secret material; callers store
//! hash prefixes and counts instead.

use drawbridge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A single audit event tied to a request or a Git session.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditEvent {
    pub id: DbId,
    /// `agent`, `owner`, or `system`.
    pub actor_kind: String,
    /// Key prefix for agents, channel identity for owners, task name for
    /// the system.
    pub actor_id: Option<String>,
    pub event_type: String,
    pub request_id: Option<DbId>,
    pub git_session_id: Option<DbId>,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
}
