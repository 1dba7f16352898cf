//! Always-allow rule models.

use drawbridge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `always_allow_rules` table.
///
/// A rule auto-approves future requests whose (key, caller address,
/// method, host, path) shape matches exactly. Rules are only ever minted
/// from an owner's approve-and-remember decision.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AlwaysAllowRule {
    pub id: DbId,
    pub user_id: DbId,
    pub api_key_id: DbId,
    pub caller_address: String,
    pub method: String,
    pub upstream_host: String,
    pub upstream_path: String,
    pub created_from_request_id: Option<DbId>,
    pub revoked_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
