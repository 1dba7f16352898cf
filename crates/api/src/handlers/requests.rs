//! Agent handlers for the brokered REST request lifecycle.
//!
//! All endpoints authenticate with a caller API key via [`AuthCaller`].
//! Poll responses surface lifecycle state as an HTTP status plus a JSON
//! view; in-progress states carry a `Retry-After` hint.

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use drawbridge_core::types::{DbId, Timestamp};
use drawbridge_db::models::proxy_request::{CreateProxyRequest, ProxyRequest};
use drawbridge_db::models::status::RequestStatus;
use serde::Serialize;

use crate::engine::requests::{
    self, CreateDisposition, DECISION_RETRY_AFTER_SECS, EXECUTION_RETRY_AFTER_SECS,
};
use crate::error::AppResult;
use crate::middleware::AuthCaller;
use crate::response::DataResponse;
use crate::state::AppState;

/// Caller-facing view of a brokered request. Headers and body are not
/// echoed back; the integrity hash stands in for the frozen capture.
#[derive(Debug, Serialize)]
pub struct RequestView {
    pub id: DbId,
    pub status: &'static str,
    pub provider: String,
    pub method: String,
    pub url: String,
    pub upstream_host: String,
    pub integrity_hash: String,
    pub idempotency_key: Option<String>,
    pub consent_hint: Option<String>,
    pub approval_deadline: Timestamp,
    pub upstream_status: Option<i16>,
    pub upstream_content_type: Option<String>,
    pub response_bytes: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub executed_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl From<&ProxyRequest> for RequestView {
    fn from(row: &ProxyRequest) -> Self {
        Self {
            id: row.id,
            status: RequestStatus::from_id(row.status_id)
                .map(|s| s.name())
                .unwrap_or("UNKNOWN"),
            provider: row.provider.clone(),
            method: row.method.clone(),
            url: row.canonical_url.clone(),
            upstream_host: row.upstream_host.clone(),
            integrity_hash: row.integrity_hash.clone(),
            idempotency_key: row.idempotency_key.clone(),
            consent_hint: row.consent_hint.clone(),
            approval_deadline: row.approval_deadline,
            upstream_status: row.upstream_status,
            upstream_content_type: row.upstream_content_type.clone(),
            response_bytes: row.response_bytes,
            error_code: row.error_code.clone(),
            error_message: row.error_message.clone(),
            executed_at: row.executed_at,
            created_at: row.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /proxy/requests
///
/// Capture a request and prompt the owner. Replays of an earlier
/// idempotency key answer 200 with the original row.
pub async fn create_request(
    caller: AuthCaller,
    State(state): State<AppState>,
    Json(input): Json<CreateProxyRequest>,
) -> AppResult<impl IntoResponse> {
    let (row, disposition) = requests::create(&state, &caller, input).await?;
    let code = match disposition {
        CreateDisposition::Replayed => StatusCode::OK,
        CreateDisposition::Fresh | CreateDisposition::AutoApproved => StatusCode::CREATED,
    };
    Ok((code, Json(DataResponse::new(RequestView::from(&row)))))
}

/// GET /proxy/requests/{id}
///
/// Poll lifecycle state. 202 while actionable; otherwise the status code
/// mirrors the terminal outcome.
pub async fn poll_request(
    caller: AuthCaller,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Response> {
    let row = requests::load_owned(&state, &caller, id).await?;
    let view = RequestView::from(&row);

    let (code, retry_after) = match RequestStatus::from_id(row.status_id) {
        Some(RequestStatus::PendingApproval) => {
            (StatusCode::ACCEPTED, Some(DECISION_RETRY_AFTER_SECS))
        }
        Some(RequestStatus::Approved) => (StatusCode::ACCEPTED, None),
        Some(RequestStatus::Executing) => {
            (StatusCode::ACCEPTED, Some(EXECUTION_RETRY_AFTER_SECS))
        }
        Some(RequestStatus::Denied) => (StatusCode::FORBIDDEN, None),
        Some(RequestStatus::Expired) => (StatusCode::REQUEST_TIMEOUT, None),
        Some(RequestStatus::Succeeded) => (StatusCode::OK, None),
        Some(RequestStatus::Failed) => (StatusCode::BAD_GATEWAY, None),
        None => (StatusCode::INTERNAL_SERVER_ERROR, None),
    };

    let mut response = (code, Json(DataResponse::new(view))).into_response();
    if let Some(secs) = retry_after {
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
    }
    Ok(response)
}

/// POST /proxy/requests/{id}/execute
///
/// Execute the approved capture exactly once and relay the upstream
/// status, content type, and body verbatim.
pub async fn execute_request(
    caller: AuthCaller,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Response> {
    requests::execute(&state, &caller, id).await
}
