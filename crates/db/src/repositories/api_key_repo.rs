//! Repository for the `api_keys` table.

use sqlx::PgPool;

use drawbridge_core::types::DbId;

use crate::models::api_key::ApiKey;

const COLUMNS: &str = "\
    id, user_id, label, key_prefix, key_hash, rotated_from_id, \
    last_used_at, revoked_at, created_at";

/// Provides CRUD operations for agent API keys.
pub struct ApiKeyRepo;

impl ApiKeyRepo {
    /// Mint a key row. The caller generates the key material and passes
    /// only the hash and display prefix.
    pub async fn create(
        pool: &PgPool,
        user_id: DbId,
        label: &str,
        key_prefix: &str,
        key_hash: &str,
    ) -> Result<ApiKey, sqlx::Error> {
        let query = format!(
            "INSERT INTO api_keys (user_id, label, key_prefix, key_hash)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ApiKey>(&query)
            .bind(user_id)
            .bind(label)
            .bind(key_prefix)
            .bind(key_hash)
            .fetch_one(pool)
            .await
    }

    /// Fetch one key by primary key, revoked or not.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ApiKey>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM api_keys WHERE id = $1");
        sqlx::query_as::<_, ApiKey>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a live key by its SHA-256 hash. Used during authentication;
    /// revoked keys never match.
    pub async fn find_by_hash(pool: &PgPool, key_hash: &str) -> Result<Option<ApiKey>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM api_keys WHERE key_hash = $1 AND revoked_at IS NULL"
        );
        sqlx::query_as::<_, ApiKey>(&query)
            .bind(key_hash)
            .fetch_optional(pool)
            .await
    }

    /// List all keys for an owner, newest first. Includes revoked keys.
    pub async fn list_for_user(pool: &PgPool, user_id: DbId) -> Result<Vec<ApiKey>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM api_keys WHERE user_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, ApiKey>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Rename a live key.
    pub async fn rename(
        pool: &PgPool,
        id: DbId,
        label: &str,
    ) -> Result<Option<ApiKey>, sqlx::Error> {
        let query = format!(
            "UPDATE api_keys SET label = $2
             WHERE id = $1 AND revoked_at IS NULL
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ApiKey>(&query)
            .bind(id)
            .bind(label)
            .fetch_optional(pool)
            .await
    }

    /// Revoke a live key. Returns `None` when the key was already
    /// revoked, so a repeated revoke is visible to the caller.
    pub async fn revoke(pool: &PgPool, id: DbId) -> Result<Option<ApiKey>, sqlx::Error> {
        let query = format!(
            "UPDATE api_keys SET revoked_at = NOW()
             WHERE id = $1 AND revoked_at IS NULL
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ApiKey>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Rotate a key: revoke the old row and mint a successor carrying the
    /// same label, linked through `rotated_from_id`. Returns `None` when
    /// the old key does not exist or is already revoked.
    pub async fn rotate(
        pool: &PgPool,
        id: DbId,
        new_prefix: &str,
        new_hash: &str,
    ) -> Result<Option<ApiKey>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let revoke = format!(
            "UPDATE api_keys SET revoked_at = NOW()
             WHERE id = $1 AND revoked_at IS NULL
             RETURNING {COLUMNS}"
        );
        let Some(old) = sqlx::query_as::<_, ApiKey>(&revoke)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        let insert = format!(
            "INSERT INTO api_keys (user_id, label, key_prefix, key_hash, rotated_from_id)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        let new = sqlx::query_as::<_, ApiKey>(&insert)
            .bind(old.user_id)
            .bind(&old.label)
            .bind(new_prefix)
            .bind(new_hash)
            .bind(old.id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(new))
    }

    /// Stamp `last_used_at`. Runs on every authenticated call, so it is
    /// fire-and-forget for the caller.
    pub async fn touch_last_used(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
