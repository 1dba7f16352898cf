//! Lifecycle engines.
//!
//! The engines own the broker's state machines: request capture,
//! decision, execution, and the Git session counterparts. Handlers stay
//! thin; everything that touches status transitions or the upstream
//! lives here.

mod credentials;
pub mod git;
pub mod requests;
pub mod upstream;

use drawbridge_db::repositories::AuditRepo;
use drawbridge_db::{DbId, DbPool};

/// Append an audit event, logging instead of propagating failures.
///
/// Audit writes live off the response path: once an upstream call has
/// been made, its outcome must reach the caller even if the audit insert
/// fails.
pub(crate) async fn record(
    pool: &DbPool,
    actor_kind: &str,
    actor_id: Option<&str>,
    event_type: &str,
    request_id: Option<DbId>,
    git_session_id: Option<DbId>,
    metadata: serde_json::Value,
) {
    if let Err(error) = AuditRepo::insert(
        pool,
        actor_kind,
        actor_id,
        event_type,
        request_id,
        git_session_id,
        metadata,
    )
    .await
    {
        tracing::error!(
            event_type = %event_type,
            request_id,
            git_session_id,
            error = %error,
            "Failed to append audit event"
        );
    }
}

/// Clip a string for prompt display, appending an ellipsis when cut.
pub(crate) fn clip(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}…")
    }
}
