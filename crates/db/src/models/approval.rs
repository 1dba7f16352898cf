//! Approval decision models and DTOs.

use drawbridge_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `approvals` table.
///
/// Exactly one of `request_id` / `git_session_id` is set. A decision is
/// recorded at most once per target; the unique constraints make the
/// first decision win.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Approval {
    pub id: DbId,
    pub request_id: Option<DbId>,
    pub git_session_id: Option<DbId>,
    pub decided_by: String,
    pub decision: String,
    pub channel_message_ref: Option<String>,
    pub rule_id: Option<DbId>,
    pub decided_at: Timestamp,
}

/// DTO for a decision arriving from the channel callback.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionRequest {
    /// Channel identity of the deciding owner.
    pub decider_identity: String,
    /// `"approve"` or `"deny"`.
    pub decision: String,
    /// Channel message the decision was taken from, for the audit trail.
    pub message_ref: Option<String>,
    /// Approve-and-remember: create an always-allow rule for this shape.
    /// Only meaningful for REST requests.
    #[serde(default)]
    pub always_allow: bool,
    /// Permit default-branch updates. Only meaningful for push sessions.
    #[serde(default)]
    pub allow_default_branch: bool,
}

impl DecisionRequest {
    pub fn is_approve(&self) -> bool {
        self.decision == "approve"
    }
}
