//! Repository for the `linked_credentials` table.
//!
//! Only ciphertext crosses this boundary. Encryption and decryption live
//! with the callers.

use sqlx::PgPool;

use drawbridge_core::types::{DbId, Timestamp};

use crate::models::credential::LinkedCredential;

const COLUMNS: &str = "\
    id, user_id, provider, secret_ciphertext, refresh_ciphertext, \
    granted_scope, expires_at, revoked_at, created_at, updated_at";

/// Provides CRUD operations for linked provider credentials.
pub struct CredentialRepo;

impl CredentialRepo {
    /// Link a credential, replacing any previous one for the same
    /// (owner, provider) pair. Re-linking clears a prior revocation.
    pub async fn upsert(
        pool: &PgPool,
        user_id: DbId,
        provider: &str,
        secret_ciphertext: &str,
        refresh_ciphertext: Option<&str>,
        granted_scope: Option<&serde_json::Value>,
        expires_at: Option<Timestamp>,
    ) -> Result<LinkedCredential, sqlx::Error> {
        let query = format!(
            "INSERT INTO linked_credentials
                (user_id, provider, secret_ciphertext, refresh_ciphertext, granted_scope, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (user_id, provider) DO UPDATE SET
                 secret_ciphertext = EXCLUDED.secret_ciphertext,
                 refresh_ciphertext = EXCLUDED.refresh_ciphertext,
                 granted_scope = EXCLUDED.granted_scope,
                 expires_at = EXCLUDED.expires_at,
                 revoked_at = NULL,
                 updated_at = NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LinkedCredential>(&query)
            .bind(user_id)
            .bind(provider)
            .bind(secret_ciphertext)
            .bind(refresh_ciphertext)
            .bind(granted_scope)
            .bind(expires_at)
            .fetch_one(pool)
            .await
    }

    /// Find the live credential for an owner and provider.
    pub async fn find_active(
        pool: &PgPool,
        user_id: DbId,
        provider: &str,
    ) -> Result<Option<LinkedCredential>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM linked_credentials
             WHERE user_id = $1 AND provider = $2 AND revoked_at IS NULL"
        );
        sqlx::query_as::<_, LinkedCredential>(&query)
            .bind(user_id)
            .bind(provider)
            .fetch_optional(pool)
            .await
    }

    /// Store a refreshed access secret and its new expiry. Providers that
    /// rotate refresh tokens on use pass the replacement ciphertext; `None`
    /// keeps the stored refresh token.
    pub async fn update_access_secret(
        pool: &PgPool,
        id: DbId,
        secret_ciphertext: &str,
        refresh_ciphertext: Option<&str>,
        expires_at: Option<Timestamp>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE linked_credentials SET
                 secret_ciphertext = $2,
                 refresh_ciphertext = COALESCE($3, refresh_ciphertext),
                 expires_at = $4,
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(id)
        .bind(secret_ciphertext)
        .bind(refresh_ciphertext)
        .bind(expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Revoke a credential by setting `revoked_at` to now.
    pub async fn revoke(
        pool: &PgPool,
        user_id: DbId,
        provider: &str,
    ) -> Result<Option<LinkedCredential>, sqlx::Error> {
        let query = format!(
            "UPDATE linked_credentials SET revoked_at = NOW(), updated_at = NOW()
             WHERE user_id = $1 AND provider = $2 AND revoked_at IS NULL
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, LinkedCredential>(&query)
            .bind(user_id)
            .bind(provider)
            .fetch_optional(pool)
            .await
    }
}
