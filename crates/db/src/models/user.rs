//! Account owner models and DTOs.

use drawbridge_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `users` table.
///
/// An owner is identified by their decision-channel identity (for example
/// a chat user id); agents never authenticate as users directly.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub channel_identity: String,
    pub display_name: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering or updating an owner from the decision channel.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertUser {
    pub channel_identity: String,
    pub display_name: Option<String>,
}
