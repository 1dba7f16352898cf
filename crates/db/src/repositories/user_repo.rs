//! Repository for the `users` table.

use sqlx::PgPool;

use drawbridge_core::types::DbId;

use crate::models::user::User;

const COLUMNS: &str = "id, channel_identity, display_name, created_at, updated_at";

/// Provides CRUD operations for account owners.
pub struct UserRepo;

impl UserRepo {
    /// Insert an owner, or refresh the display name if the channel
    /// identity is already registered.
    pub async fn upsert(
        pool: &PgPool,
        channel_identity: &str,
        display_name: Option<&str>,
    ) -> Result<User, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (channel_identity, display_name)
             VALUES ($1, $2)
             ON CONFLICT (channel_identity) DO UPDATE SET
                 display_name = COALESCE(EXCLUDED.display_name, users.display_name),
                 updated_at = NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, User>(&query)
            .bind(channel_identity)
            .bind(display_name)
            .fetch_one(pool)
            .await
    }

    /// Find an owner by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<User>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
