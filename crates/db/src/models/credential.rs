//! Linked third-party credential models and DTOs.

use drawbridge_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `linked_credentials` table.
///
/// **Note:** ciphertext columns are never serialized. Responses expose only
/// provider, scope, and lifecycle timestamps.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LinkedCredential {
    pub id: DbId,
    pub user_id: DbId,
    pub provider: String,
    #[serde(skip_serializing)]
    pub secret_ciphertext: String,
    #[serde(skip_serializing)]
    pub refresh_ciphertext: Option<String>,
    pub granted_scope: Option<serde_json::Value>,
    pub expires_at: Option<Timestamp>,
    pub revoked_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for linking (or replacing) a provider credential.
///
/// Secrets arrive in plaintext over the channel callback and are encrypted
/// before they reach the repository layer.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkCredential {
    pub secret: String,
    pub refresh_secret: Option<String>,
    pub granted_scope: Option<serde_json::Value>,
    pub expires_at: Option<Timestamp>,
}
