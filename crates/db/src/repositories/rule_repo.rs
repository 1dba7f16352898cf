//! Repository for the `always_allow_rules` table.

use sqlx::PgPool;

use drawbridge_core::types::DbId;

use crate::models::rule::AlwaysAllowRule;

const COLUMNS: &str = "\
    id, user_id, api_key_id, caller_address, method, upstream_host, \
    upstream_path, created_from_request_id, revoked_at, created_at, updated_at";

/// Provides CRUD operations for always-allow rules.
pub struct RuleRepo;

impl RuleRepo {
    /// Mint a rule from an approve-and-remember decision. Re-approving a
    /// shape whose rule was revoked re-enables it.
    pub async fn upsert(
        pool: &PgPool,
        user_id: DbId,
        api_key_id: DbId,
        caller_address: &str,
        method: &str,
        upstream_host: &str,
        upstream_path: &str,
        created_from_request_id: DbId,
    ) -> Result<AlwaysAllowRule, sqlx::Error> {
        let query = format!(
            "INSERT INTO always_allow_rules
                (user_id, api_key_id, caller_address, method, upstream_host,
                 upstream_path, created_from_request_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT ON CONSTRAINT uq_always_allow_rules_scope DO UPDATE SET
                 revoked_at = NULL,
                 created_from_request_id = EXCLUDED.created_from_request_id,
                 updated_at = NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AlwaysAllowRule>(&query)
            .bind(user_id)
            .bind(api_key_id)
            .bind(caller_address)
            .bind(method)
            .bind(upstream_host)
            .bind(upstream_path)
            .bind(created_from_request_id)
            .fetch_one(pool)
            .await
    }

    /// Find a live rule matching the exact shape of an incoming request.
    pub async fn find_match(
        pool: &PgPool,
        user_id: DbId,
        api_key_id: DbId,
        caller_address: &str,
        method: &str,
        upstream_host: &str,
        upstream_path: &str,
    ) -> Result<Option<AlwaysAllowRule>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM always_allow_rules
             WHERE user_id = $1 AND api_key_id = $2 AND caller_address = $3
               AND method = $4 AND upstream_host = $5 AND upstream_path = $6
               AND revoked_at IS NULL"
        );
        sqlx::query_as::<_, AlwaysAllowRule>(&query)
            .bind(user_id)
            .bind(api_key_id)
            .bind(caller_address)
            .bind(method)
            .bind(upstream_host)
            .bind(upstream_path)
            .fetch_optional(pool)
            .await
    }

    /// List all live rules for an owner.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<AlwaysAllowRule>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM always_allow_rules
             WHERE user_id = $1 AND revoked_at IS NULL
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, AlwaysAllowRule>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Revoke a rule by setting `revoked_at` to now.
    pub async fn revoke(pool: &PgPool, id: DbId) -> Result<Option<AlwaysAllowRule>, sqlx::Error> {
        let query = format!(
            "UPDATE always_allow_rules SET revoked_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND revoked_at IS NULL
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AlwaysAllowRule>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
