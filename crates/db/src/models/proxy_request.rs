//! Brokered REST request models and DTOs.

use std::collections::BTreeMap;

use drawbridge_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `proxy_requests` table.
///
/// The row is the immutable capture of what the agent asked for: the
/// canonical method, URL, headers, and body are frozen at creation and
/// execution replays exactly these values. Outcome columns are filled in
/// once, when the request reaches a terminal state.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProxyRequest {
    pub id: DbId,
    pub user_id: DbId,
    pub api_key_id: DbId,
    pub key_label_snapshot: String,
    pub caller_address: Option<String>,
    pub provider: String,
    pub method: String,
    pub canonical_url: String,
    pub upstream_host: String,
    pub upstream_path: String,
    pub headers_json: serde_json::Value,
    pub body: Option<String>,
    pub integrity_hash: String,
    pub idempotency_key: Option<String>,
    pub consent_hint: Option<String>,
    pub status_id: i16,
    pub approval_deadline: Timestamp,
    pub prompt_message_ref: Option<String>,
    pub upstream_status: Option<i16>,
    pub upstream_content_type: Option<String>,
    pub response_bytes: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub executed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for an agent submitting a request for approval. The provider is
/// not named by the caller; it is resolved from the upstream hostname.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProxyRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub idempotency_key: Option<String>,
    pub consent_hint: Option<String>,
}

/// Fully validated insert payload, built by the request engine after
/// canonicalization. Field order matches the insert column list.
#[derive(Debug)]
pub struct NewProxyRequest<'a> {
    pub user_id: DbId,
    pub api_key_id: DbId,
    pub key_label_snapshot: &'a str,
    pub caller_address: Option<&'a str>,
    pub provider: &'a str,
    pub method: &'a str,
    pub canonical_url: &'a str,
    pub upstream_host: &'a str,
    pub upstream_path: &'a str,
    pub headers_json: serde_json::Value,
    pub body: Option<&'a str>,
    pub integrity_hash: &'a str,
    pub idempotency_key: Option<&'a str>,
    pub consent_hint: Option<&'a str>,
    pub approval_deadline: Timestamp,
}
