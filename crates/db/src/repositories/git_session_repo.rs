//! Repository for the `git_sessions` table.

use sqlx::PgPool;

use drawbridge_core::types::{DbId, Timestamp};

use crate::models::git_session::{GitSession, NewGitSession};
use crate::models::status::GitSessionStatus;

const COLUMNS: &str = "\
    id, user_id, api_key_id, key_label_snapshot, caller_address, provider, \
    operation, repo_host, repo_path, repo_url, status_id, secret_hash, \
    secret_ciphertext, allow_default_branch_push, default_branch_ref, \
    consent_hint, approval_deadline, remote_revealed_at, prompt_message_ref, \
    error_code, last_activity_at, created_at, updated_at";

/// Provides CRUD operations for Git proxy sessions.
pub struct GitSessionRepo;

impl GitSessionRepo {
    /// Insert a session, pending approval.
    pub async fn create(
        pool: &PgPool,
        input: &NewGitSession<'_>,
    ) -> Result<GitSession, sqlx::Error> {
        let query = format!(
            "INSERT INTO git_sessions
                (user_id, api_key_id, key_label_snapshot, caller_address, provider,
                 operation, repo_host, repo_path, repo_url, secret_hash,
                 secret_ciphertext, consent_hint, status_id, approval_deadline)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GitSession>(&query)
            .bind(input.user_id)
            .bind(input.api_key_id)
            .bind(input.key_label_snapshot)
            .bind(input.caller_address)
            .bind(input.provider)
            .bind(input.operation)
            .bind(input.repo_host)
            .bind(input.repo_path)
            .bind(input.repo_url)
            .bind(input.secret_hash)
            .bind(input.secret_ciphertext)
            .bind(input.consent_hint)
            .bind(GitSessionStatus::PendingApproval.id())
            .bind(input.approval_deadline)
            .fetch_one(pool)
            .await
    }

    /// Find a session by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<GitSession>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM git_sessions WHERE id = $1");
        sqlx::query_as::<_, GitSession>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Record the channel message carrying the approval prompt.
    pub async fn set_prompt_ref(
        pool: &PgPool,
        id: DbId,
        message_ref: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE git_sessions SET prompt_message_ref = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(message_ref)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a decision: pending -> approved or pending -> denied, with
    /// the Approval row inserted in the same transaction. `None` means the
    /// session was no longer pending and nothing was written.
    ///
    /// `allow_default_branch` only matters on approval of a push session;
    /// it is stored as given either way.
    pub async fn decide(
        pool: &PgPool,
        id: DbId,
        to: GitSessionStatus,
        allow_default_branch: bool,
        decided_by: &str,
        decision: &str,
        channel_message_ref: Option<&str>,
    ) -> Result<Option<GitSession>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let update = format!(
            "UPDATE git_sessions SET
                 status_id = $2, allow_default_branch_push = $3, updated_at = NOW()
             WHERE id = $1 AND status_id = $4
             RETURNING {COLUMNS}"
        );
        let Some(row) = sqlx::query_as::<_, GitSession>(&update)
            .bind(id)
            .bind(to.id())
            .bind(allow_default_branch)
            .bind(GitSessionStatus::PendingApproval.id())
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO approvals
                (git_session_id, decided_by, decision, channel_message_ref)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(decided_by)
        .bind(decision)
        .bind(channel_message_ref)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row))
    }

    /// Consume the one-time remote reveal. At most one caller ever wins
    /// this update; the status is left alone so an approved session still
    /// activates on its first proxied call.
    pub async fn reveal_remote(pool: &PgPool, id: DbId) -> Result<Option<GitSession>, sqlx::Error> {
        let query = format!(
            "UPDATE git_sessions SET remote_revealed_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND status_id IN ($2, $3) AND remote_revealed_at IS NULL
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GitSession>(&query)
            .bind(id)
            .bind(GitSessionStatus::Approved.id())
            .bind(GitSessionStatus::Active.id())
            .fetch_optional(pool)
            .await
    }

    /// First proxied call: approved -> active. Later calls are no-ops
    /// because the session is already active.
    pub async fn mark_active(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE git_sessions SET status_id = $2, updated_at = NOW()
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(GitSessionStatus::Active.id())
        .bind(GitSessionStatus::Approved.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Update `last_activity_at`, pushing back the idle-expiry horizon.
    pub async fn touch_activity(pool: &PgPool, id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE git_sessions SET last_activity_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Record the default branch discovered from a ref advertisement.
    /// First observation wins; later calls are no-ops.
    pub async fn set_default_branch(
        pool: &PgPool,
        id: DbId,
        ref_name: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE git_sessions SET default_branch_ref = $2, updated_at = NOW()
             WHERE id = $1 AND default_branch_ref IS NULL",
        )
        .bind(id)
        .bind(ref_name)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Consume a session after its write round-trip: active -> used.
    pub async fn mark_used(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE git_sessions SET status_id = $2, updated_at = NOW()
             WHERE id = $1 AND status_id = $3",
        )
        .bind(id)
        .bind(GitSessionStatus::Used.id())
        .bind(GitSessionStatus::Active.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Expire a single overdue session if it is still awaiting approval or
    /// its first use. Used on the read paths so a stale row reports expiry
    /// without waiting for the sweeper.
    pub async fn mark_expired_if_overdue(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE git_sessions SET status_id = $2, updated_at = NOW()
             WHERE id = $1 AND status_id IN ($3, $4) AND approval_deadline < NOW()",
        )
        .bind(id)
        .bind(GitSessionStatus::Expired.id())
        .bind(GitSessionStatus::PendingApproval.id())
        .bind(GitSessionStatus::Approved.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Bulk-expire every session past its approval deadline. Returns the
    /// expired rows so the sweeper can audit each one.
    pub async fn expire_overdue(pool: &PgPool) -> Result<Vec<GitSession>, sqlx::Error> {
        let query = format!(
            "UPDATE git_sessions SET status_id = $1, updated_at = NOW()
             WHERE status_id IN ($2, $3) AND approval_deadline < NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GitSession>(&query)
            .bind(GitSessionStatus::Expired.id())
            .bind(GitSessionStatus::PendingApproval.id())
            .bind(GitSessionStatus::Approved.id())
            .fetch_all(pool)
            .await
    }

    /// Bulk-expire active sessions with no proxy traffic since `idle_cutoff`.
    pub async fn expire_idle(
        pool: &PgPool,
        idle_cutoff: Timestamp,
    ) -> Result<Vec<GitSession>, sqlx::Error> {
        let query = format!(
            "UPDATE git_sessions SET status_id = $1, updated_at = NOW()
             WHERE status_id = $2 AND last_activity_at < $3
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GitSession>(&query)
            .bind(GitSessionStatus::Expired.id())
            .bind(GitSessionStatus::Active.id())
            .bind(idle_cutoff)
            .fetch_all(pool)
            .await
    }
}
