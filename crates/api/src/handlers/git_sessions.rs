//! Agent handlers for Git proxy session management.
//!
//! These cover opening, polling, and the one-time remote reveal. The
//! wire proxy itself lives in [`super::git_proxy`] because it
//! authenticates with the session secret, not the caller key.

use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use drawbridge_core::types::{DbId, Timestamp};
use drawbridge_db::models::git_session::{CreateGitSession, GitSession};
use drawbridge_db::models::status::GitSessionStatus;
use serde::Serialize;

use crate::engine::git;
use crate::engine::requests::DECISION_RETRY_AFTER_SECS;
use crate::error::AppResult;
use crate::middleware::AuthCaller;
use crate::response::DataResponse;
use crate::state::AppState;

/// Caller-facing view of a Git session. The secret never appears here;
/// the remote endpoint is its only outlet.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: DbId,
    pub status: &'static str,
    pub provider: String,
    pub operation: String,
    pub repo_host: String,
    pub repo_path: String,
    pub repo_url: String,
    pub allow_default_branch_push: bool,
    pub consent_hint: Option<String>,
    pub approval_deadline: Timestamp,
    pub remote_revealed: bool,
    pub error_code: Option<String>,
    pub last_activity_at: Timestamp,
    pub created_at: Timestamp,
}

impl From<&GitSession> for SessionView {
    fn from(row: &GitSession) -> Self {
        Self {
            id: row.id,
            status: GitSessionStatus::from_id(row.status_id)
                .map(|s| s.name())
                .unwrap_or("UNKNOWN"),
            provider: row.provider.clone(),
            operation: row.operation.clone(),
            repo_host: row.repo_host.clone(),
            repo_path: row.repo_path.clone(),
            repo_url: row.repo_url.clone(),
            allow_default_branch_push: row.allow_default_branch_push,
            consent_hint: row.consent_hint.clone(),
            approval_deadline: row.approval_deadline,
            remote_revealed: row.remote_revealed_at.is_some(),
            error_code: row.error_code.clone(),
            last_activity_at: row.last_activity_at,
            created_at: row.created_at,
        }
    }
}

/// Response for the one-time remote reveal.
#[derive(Debug, Serialize)]
pub struct RemoteResponse {
    /// Remote URL embedding the session secret. Shown exactly once.
    pub remote_url: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /git/sessions
///
/// Open a session for one Git operation and prompt the owner.
pub async fn create_session(
    caller: AuthCaller,
    State(state): State<AppState>,
    Json(input): Json<CreateGitSession>,
) -> AppResult<impl IntoResponse> {
    let row = git::create(&state, &caller, input).await?;
    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(SessionView::from(&row))),
    ))
}

/// GET /git/sessions/{id}
///
/// Poll session state. 202 while a decision is outstanding.
pub async fn poll_session(
    caller: AuthCaller,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Response> {
    let row = git::load_owned(&state, &caller, id).await?;
    let view = SessionView::from(&row);

    let (code, retry_after) = match GitSessionStatus::from_id(row.status_id) {
        Some(GitSessionStatus::PendingApproval) => {
            (StatusCode::ACCEPTED, Some(DECISION_RETRY_AFTER_SECS))
        }
        Some(GitSessionStatus::Approved) => (StatusCode::ACCEPTED, None),
        Some(GitSessionStatus::Active) | Some(GitSessionStatus::Used) => (StatusCode::OK, None),
        Some(GitSessionStatus::Denied) => (StatusCode::FORBIDDEN, None),
        Some(GitSessionStatus::Expired) => (StatusCode::REQUEST_TIMEOUT, None),
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

/// GET /git/sessions/{id}/remote
///
/// Reveal the remote URL embedding the session secret, exactly once.
pub async fn get_remote(
    caller: AuthCaller,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let (_row, remote_url) = git::reveal(&state, &caller, id).await?;
    Ok(Json(DataResponse::new(RemoteResponse { remote_url })))
}
