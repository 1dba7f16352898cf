//! Repository for the `proxy_requests` table.
//!
//! Lifecycle transitions are compare-and-set on the current status so a
//! decision, a claim, or an expiry fires at most once no matter how many
//! workers race for it.

use sqlx::PgPool;

use drawbridge_core::types::DbId;

use crate::models::proxy_request::{NewProxyRequest, ProxyRequest};
use crate::models::status::RequestStatus;

const COLUMNS: &str = "\
    id, user_id, api_key_id, key_label_snapshot, caller_address, provider, \
    method, canonical_url, upstream_host, upstream_path, headers_json, body, \
    integrity_hash, idempotency_key, consent_hint, status_id, \
    approval_deadline, prompt_message_ref, upstream_status, \
    upstream_content_type, response_bytes, error_code, error_message, \
    executed_at, created_at, updated_at";

/// Provides CRUD operations for brokered requests.
pub struct RequestRepo;

impl RequestRepo {
    /// Insert the immutable capture of an agent request, pending approval.
    pub async fn create(
        pool: &PgPool,
        input: &NewProxyRequest<'_>,
    ) -> Result<ProxyRequest, sqlx::Error> {
        let query = format!(
            "INSERT INTO proxy_requests
                (user_id, api_key_id, key_label_snapshot, caller_address, provider,
                 method, canonical_url, upstream_host, upstream_path, headers_json,
                 body, integrity_hash, idempotency_key, consent_hint, status_id,
                 approval_deadline)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProxyRequest>(&query)
            .bind(input.user_id)
            .bind(input.api_key_id)
            .bind(input.key_label_snapshot)
            .bind(input.caller_address)
            .bind(input.provider)
            .bind(input.method)
            .bind(input.canonical_url)
            .bind(input.upstream_host)
            .bind(input.upstream_path)
            .bind(&input.headers_json)
            .bind(input.body)
            .bind(input.integrity_hash)
            .bind(input.idempotency_key)
            .bind(input.consent_hint)
            .bind(RequestStatus::PendingApproval.id())
            .bind(input.approval_deadline)
            .fetch_one(pool)
            .await
    }

    /// Find a request by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ProxyRequest>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM proxy_requests WHERE id = $1");
        sqlx::query_as::<_, ProxyRequest>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find an earlier capture made with the same caller key and
    /// idempotency key.
    pub async fn find_by_idempotency(
        pool: &PgPool,
        api_key_id: DbId,
        idempotency_key: &str,
    ) -> Result<Option<ProxyRequest>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM proxy_requests
             WHERE api_key_id = $1 AND idempotency_key = $2"
        );
        sqlx::query_as::<_, ProxyRequest>(&query)
            .bind(api_key_id)
            .bind(idempotency_key)
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
            "UPDATE proxy_requests SET prompt_message_ref = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(message_ref)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a decision: pending -> approved or pending -> denied, with
    /// the Approval row inserted in the same transaction. The conditional
    /// update makes the first decision win; `None` means the request was
    /// no longer pending and nothing was written.
    pub async fn decide(
        pool: &PgPool,
        id: DbId,
        to: RequestStatus,
        decided_by: &str,
        decision: &str,
        channel_message_ref: Option<&str>,
        rule_id: Option<DbId>,
    ) -> Result<Option<ProxyRequest>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let update = format!(
            "UPDATE proxy_requests SET status_id = $2, updated_at = NOW()
             WHERE id = $1 AND status_id = $3
             RETURNING {COLUMNS}"
        );
        let Some(row) = sqlx::query_as::<_, ProxyRequest>(&update)
            .bind(id)
            .bind(to.id())
            .bind(RequestStatus::PendingApproval.id())
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO approvals
                (request_id, decided_by, decision, channel_message_ref, rule_id)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(decided_by)
        .bind(decision)
        .bind(channel_message_ref)
        .bind(rule_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row))
    }

    /// Claim an approved request for execution: approved -> executing.
    ///
    /// At most one caller wins the claim; everyone else gets `None`.
    pub async fn claim_for_execution(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ProxyRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE proxy_requests SET status_id = $2, updated_at = NOW()
             WHERE id = $1 AND status_id = $3
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProxyRequest>(&query)
            .bind(id)
            .bind(RequestStatus::Executing.id())
            .bind(RequestStatus::Approved.id())
            .fetch_optional(pool)
            .await
    }

    /// Settle an executing request into its terminal state, recording the
    /// upstream outcome metadata. The response body itself is never stored.
    #[allow(clippy::too_many_arguments)]
    pub async fn finish_execution(
        pool: &PgPool,
        id: DbId,
        to: RequestStatus,
        upstream_status: Option<i16>,
        upstream_content_type: Option<&str>,
        response_bytes: Option<i64>,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE proxy_requests SET
                 status_id = $2, upstream_status = $3, upstream_content_type = $4,
                 response_bytes = $5, error_code = $6, error_message = $7,
                 executed_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND status_id = $8",
        )
        .bind(id)
        .bind(to.id())
        .bind(upstream_status)
        .bind(upstream_content_type)
        .bind(response_bytes)
        .bind(error_code)
        .bind(error_message)
        .bind(RequestStatus::Executing.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Expire a single overdue request if it is still awaiting approval or
    /// execution. Used on the read paths so a stale row reports expiry
    /// without waiting for the sweeper.
    pub async fn mark_expired_if_overdue(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE proxy_requests SET status_id = $2, updated_at = NOW()
             WHERE id = $1 AND status_id IN ($3, $4) AND approval_deadline < NOW()",
        )
        .bind(id)
        .bind(RequestStatus::Expired.id())
        .bind(RequestStatus::PendingApproval.id())
        .bind(RequestStatus::Approved.id())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Bulk-expire every request past its approval deadline. Returns the
    /// expired rows so the sweeper can audit each one.
    pub async fn expire_overdue(pool: &PgPool) -> Result<Vec<ProxyRequest>, sqlx::Error> {
        let query = format!(
            "UPDATE proxy_requests SET status_id = $1, updated_at = NOW()
             WHERE status_id IN ($2, $3) AND approval_deadline < NOW()
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProxyRequest>(&query)
            .bind(RequestStatus::Expired.id())
            .bind(RequestStatus::PendingApproval.id())
            .bind(RequestStatus::Approved.id())
            .fetch_all(pool)
            .await
    }
}
