//! Agent API key models and DTOs.

use drawbridge_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `api_keys` table.
///
/// **Note:** `key_hash` is never serialized to responses. The `key_prefix`
/// field is used for human-readable identification.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ApiKey {
    pub id: DbId,
    pub user_id: DbId,
    pub label: String,
    pub key_prefix: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub rotated_from_id: Option<DbId>,
    pub last_used_at: Option<Timestamp>,
    pub revoked_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Response returned when a key is minted or rotated.
/// Includes the plaintext key (shown exactly once).
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyCreatedResponse {
    pub id: DbId,
    pub label: String,
    pub key_prefix: String,
    /// The full plaintext key. Shown **once** and never stored.
    pub plaintext_key: String,
    pub created_at: Timestamp,
}

/// DTO for minting a new API key.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateApiKey {
    pub label: String,
}

/// DTO for renaming an existing API key.
#[derive(Debug, Clone, Deserialize)]
pub struct RenameApiKey {
    pub label: String,
}
