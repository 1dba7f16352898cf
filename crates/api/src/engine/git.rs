//! Git smart-HTTP session lifecycle and wire proxy.
//!
//! A session scopes one approved Git operation against one repository.
//! The wire proxy speaks just enough smart HTTP to gate it: ref
//! advertisement plus the two service calls, with the receive-pack
//! command section inspected before anything reaches the upstream.

use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::Response;
use chrono::Utc;
use drawbridge_core::canonical::validate_upstream_url;
use drawbridge_core::error::CoreError;
use drawbridge_core::hashing::constant_time_eq;
use drawbridge_core::pktline::{
    check_push_safety, discover_head_symref, scan_commands, CommandScan, PushPolicy,
};
use drawbridge_core::secrets::{generate_session_secret, hash_secret};
use drawbridge_db::models::approval::DecisionRequest;
use drawbridge_db::models::git_session::{CreateGitSession, GitSession, NewGitSession};
use drawbridge_db::models::status::GitSessionStatus;
use drawbridge_db::models::user::User;
use drawbridge_db::repositories::{GitSessionRepo, UserRepo};
use drawbridge_db::DbId;
use futures::StreamExt;
use serde_json::json;
use url::Url;

use crate::channel::{ApprovalPrompt, PromptKind};
use crate::error::{AppError, AppResult};
use crate::middleware::AuthCaller;
use crate::state::AppState;

use super::credentials::{find_credential, unlock_access_secret};
use super::upstream::{collect_capped, count_and_cap, UpstreamFailure, WireRequest};
use super::{clip, record};

/// Operation kinds a session can be opened for.
const OPERATIONS: &[&str] = &["clone", "fetch", "pull", "push"];

/// The two smart-HTTP services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitService {
    UploadPack,
    ReceivePack,
}

impl GitService {
    /// The rpc path segment and `service=` parameter value.
    pub fn rpc_name(self) -> &'static str {
        match self {
            GitService::UploadPack => "git-upload-pack",
            GitService::ReceivePack => "git-receive-pack",
        }
    }

    pub fn from_param(name: &str) -> Option<Self> {
        match name {
            "git-upload-pack" => Some(GitService::UploadPack),
            "git-receive-pack" => Some(GitService::ReceivePack),
            _ => None,
        }
    }

    /// Read operations negotiate with upload-pack; push uses receive-pack.
    fn permitted_for(self, session: &GitSession) -> bool {
        match self {
            GitService::UploadPack => !session.is_push(),
            GitService::ReceivePack => session.is_push(),
        }
    }
}

/// Open a session: validate coordinates, mint the secret, prompt the owner.
pub async fn create(
    state: &AppState,
    caller: &AuthCaller,
    input: CreateGitSession,
) -> AppResult<GitSession> {
    if !OPERATIONS.contains(&input.operation.as_str()) {
        return Err(CoreError::Validation(format!(
            "operation must be one of clone, fetch, pull, push (got {})",
            input.operation
        ))
        .into());
    }

    let url = validate_upstream_url(&input.repo, state.config.allow_http_upstream)?;
    if url.query().is_some() {
        return Err(
            CoreError::Validation("repository URL must not carry a query string".into()).into(),
        );
    }
    let host = url
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .ok_or_else(|| CoreError::Validation("repository URL has no host".into()))?;
    let provider = state.providers.for_git_host(&host).ok_or_else(|| {
        CoreError::Validation(format!("no provider is configured for git host {host}"))
    })?;
    let repo_path = validate_repo_path(url.path())?;
    let repo_url = url.as_str().trim_end_matches('/').to_string();

    let owner = load_owner(state, caller.user_id).await?;

    // The plaintext secret lives for this function only; the row keeps
    // its hash (wire auth) and ciphertext (one-time reveal).
    let secret = generate_session_secret();
    let secret_hash = hash_secret(&secret);
    let secret_ciphertext = state.cipher.encrypt(&secret)?;
    drop(secret);

    let deadline = Utc::now() + chrono::Duration::seconds(state.config.git_session_ttl_secs);
    let row = GitSessionRepo::create(
        &state.pool,
        &NewGitSession {
            user_id: caller.user_id,
            api_key_id: caller.api_key_id,
            key_label_snapshot: &caller.key_label,
            caller_address: caller.address.as_deref(),
            provider: provider.id(),
            operation: &input.operation,
            repo_host: &host,
            repo_path: &repo_path,
            repo_url: &repo_url,
            secret_hash: &secret_hash,
            secret_ciphertext: &secret_ciphertext,
            consent_hint: input.consent_hint.as_deref(),
            approval_deadline: deadline,
        },
    )
    .await?;

    let prompt = build_session_prompt(&owner, caller, &row);
    match state.channel.prompt_session(&prompt).await {
        Ok(Some(message_ref)) => {
            GitSessionRepo::set_prompt_ref(&state.pool, row.id, &message_ref).await?;
        }
        Ok(None) => {}
        Err(error) => {
            tracing::warn!(session_id = row.id, error = %error, "Approval prompt delivery failed");
        }
    }

    record(
        &state.pool,
        "agent",
        Some(&caller.key_prefix),
        "session.created",
        None,
        Some(row.id),
        json!({ "operation": row.operation, "repo_host": row.repo_host, "repo_path": row.repo_path }),
    )
    .await;

    tracing::info!(
        session_id = row.id,
        operation = %row.operation,
        repo_host = %row.repo_host,
        "Git session opened and owner prompted"
    );
    Ok(row)
}

/// Load a session for the caller that opened it, applying lazy expiry.
pub async fn load_owned(state: &AppState, caller: &AuthCaller, id: DbId) -> AppResult<GitSession> {
    let row = GitSessionRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "git session",
            id,
        })?;

    if row.api_key_id != caller.api_key_id {
        return Err(CoreError::Forbidden(
            "session was opened by a different API key".into(),
        )
        .into());
    }

    expire_if_overdue(state, row).await
}

/// Record the owner's decision on a session.
pub async fn decide(state: &AppState, id: DbId, input: &DecisionRequest) -> AppResult<GitSession> {
    if input.decision != "approve" && input.decision != "deny" {
        return Err(AppError::BadRequest(
            "decision must be approve or deny".to_string(),
        ));
    }

    let row = GitSessionRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "git session",
            id,
        })?;
    let owner = load_owner(state, row.user_id).await?;

    if input.decider_identity != owner.channel_identity {
        return Err(CoreError::Forbidden(
            "only the account owner may decide this session".into(),
        )
        .into());
    }

    let row = expire_if_overdue(state, row).await?;
    let status = session_status(&row)?;
    if status == GitSessionStatus::Expired {
        return Err(AppError::broker(
            StatusCode::REQUEST_TIMEOUT,
            "APPROVAL_EXPIRED",
            "the approval window elapsed before a decision was recorded",
        ));
    }
    if status != GitSessionStatus::PendingApproval {
        return Err(AppError::broker(
            StatusCode::CONFLICT,
            "NOT_PENDING",
            format!("session is {} and no longer accepts decisions", status.name()),
        ));
    }

    let to = if input.is_approve() {
        GitSessionStatus::Approved
    } else {
        GitSessionStatus::Denied
    };
    // The allow flag only has meaning when the owner approves a push.
    let allow_default_branch = input.is_approve() && input.allow_default_branch && row.is_push();
    let decided = GitSessionRepo::decide(
        &state.pool,
        row.id,
        to,
        allow_default_branch,
        &input.decider_identity,
        &input.decision,
        input.message_ref.as_deref(),
    )
    .await?
    .ok_or_else(|| {
        AppError::broker(
            StatusCode::CONFLICT,
            "ALREADY_DECIDED",
            "another decision won the race for this session",
        )
    })?;

    let event = if input.is_approve() {
        "session.approved"
    } else {
        "session.denied"
    };
    record(
        &state.pool,
        "owner",
        Some(&input.decider_identity),
        event,
        None,
        Some(decided.id),
        json!({
            "message_ref": input.message_ref,
            "allow_default_branch_push": decided.allow_default_branch_push,
        }),
    )
    .await;

    tracing::info!(
        session_id = decided.id,
        decision = %input.decision,
        allow_default_branch_push = decided.allow_default_branch_push,
        "Git session decided"
    );
    Ok(decided)
}

/// Reveal the one-time remote URL embedding the session secret.
pub async fn reveal(
    state: &AppState,
    caller: &AuthCaller,
    id: DbId,
) -> AppResult<(GitSession, String)> {
    let row = load_owned(state, caller, id).await?;
    match session_status(&row)? {
        GitSessionStatus::PendingApproval => {
            return Err(AppError::broker_retry(
                StatusCode::CONFLICT,
                "SESSION_NOT_READY",
                "the session has not been approved yet",
                super::requests::DECISION_RETRY_AFTER_SECS,
            ));
        }
        GitSessionStatus::Denied => {
            return Err(AppError::broker(
                StatusCode::FORBIDDEN,
                "DENIED",
                "the owner denied this session",
            ));
        }
        GitSessionStatus::Expired => {
            return Err(AppError::broker(
                StatusCode::REQUEST_TIMEOUT,
                "APPROVAL_EXPIRED",
                "the approval window elapsed",
            ));
        }
        GitSessionStatus::Used => {
            return Err(AppError::broker(
                StatusCode::GONE,
                "SESSION_USED",
                "this session has consumed its single write",
            ));
        }
        GitSessionStatus::Approved | GitSessionStatus::Active => {}
    }
    if row.remote_revealed_at.is_some() {
        return Err(already_revealed());
    }

    let revealed = GitSessionRepo::reveal_remote(&state.pool, row.id)
        .await?
        .ok_or_else(already_revealed)?;
    let secret = state.cipher.decrypt(&revealed.secret_ciphertext)?;
    let remote_url = format!(
        "{}/git/session/{}/{}",
        state.config.public_base_url, revealed.id, secret
    );

    record(
        &state.pool,
        "agent",
        Some(&caller.key_prefix),
        "session.remote_revealed",
        None,
        Some(revealed.id),
        json!({ "repo_url": revealed.repo_url }),
    )
    .await;

    tracing::info!(session_id = revealed.id, "Session remote revealed");
    Ok((revealed, remote_url))
}

fn already_revealed() -> AppError {
    AppError::broker(
        StatusCode::GONE,
        "REMOTE_ALREADY_REVEALED",
        "the remote URL for this session was already revealed",
    )
}

/// Admit one wire call: secret, service-vs-operation, then session state.
///
/// First admitted call moves an approved session to active. Activity is
/// touched only for admitted calls so rejected traffic cannot keep a
/// session alive.
async fn gate(
    state: &AppState,
    id: DbId,
    secret: &str,
    service: GitService,
) -> AppResult<GitSession> {
    let row = GitSessionRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "git session",
            id,
        })?;

    if !constant_time_eq(&hash_secret(secret), &row.secret_hash) {
        return Err(CoreError::Forbidden("session secret mismatch".into()).into());
    }

    if !service.permitted_for(&row) {
        return Err(CoreError::Forbidden(format!(
            "session was approved for {}, which does not use {}",
            row.operation,
            service.rpc_name()
        ))
        .into());
    }

    let mut row = expire_if_overdue(state, row).await?;
    match session_status(&row)? {
        GitSessionStatus::PendingApproval => {
            return Err(AppError::broker_retry(
                StatusCode::CONFLICT,
                "SESSION_NOT_READY",
                "the session has not been approved yet",
                super::requests::DECISION_RETRY_AFTER_SECS,
            ));
        }
        GitSessionStatus::Denied => {
            return Err(AppError::broker(
                StatusCode::FORBIDDEN,
                "DENIED",
                "the owner denied this session",
            ));
        }
        GitSessionStatus::Expired => {
            return Err(AppError::broker(
                StatusCode::REQUEST_TIMEOUT,
                "APPROVAL_EXPIRED",
                "the session expired",
            ));
        }
        GitSessionStatus::Used => {
            return Err(AppError::broker(
                StatusCode::GONE,
                "SESSION_USED",
                "this session has consumed its single write",
            ));
        }
        GitSessionStatus::Approved => {
            if GitSessionRepo::mark_active(&state.pool, row.id).await? {
                record(
                    &state.pool,
                    "agent",
                    None,
                    "session.activated",
                    None,
                    Some(row.id),
                    json!({}),
                )
                .await;
                tracing::info!(session_id = row.id, "Session activated by first wire call");
            }
            row.status_id = GitSessionStatus::Active.id();
        }
        GitSessionStatus::Active => {}
    }

    GitSessionRepo::touch_activity(&state.pool, row.id).await?;
    Ok(row)
}

/// `GET {repo}/info/refs?service=...`: relay the ref advertisement and
/// opportunistically cache the default branch.
pub async fn info_refs(
    state: &AppState,
    id: DbId,
    secret: &str,
    service_param: Option<&str>,
) -> AppResult<Response> {
    let service_name = service_param.ok_or_else(|| {
        CoreError::Validation("info/refs requires a service parameter".into())
    })?;
    let service = GitService::from_param(service_name).ok_or_else(|| {
        CoreError::Validation(format!("unknown git service {service_name}"))
    })?;

    let session = gate(state, id, secret, service).await?;
    let auth = git_auth(state, &session).await?;
    let url = rpc_url(&session, &format!("info/refs?service={}", service.rpc_name()))?;

    let response = state
        .upstream
        .relay(WireRequest {
            method: reqwest::Method::GET,
            url,
            basic_auth: Some(auth.clone()),
            content_type: None,
            accept: None,
            body: None,
            timeout: git_timeout(state),
        })
        .await
        .map_err(wire_failure)?;

    let status = response.status();
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let body = collect_capped(response, state.config.git_byte_cap)
        .await
        .map_err(wire_failure)?;

    if session.default_branch_ref.is_none() && status.is_success() {
        let discovered = match service {
            GitService::UploadPack => discover_head_symref(&body),
            // The receive-pack advertisement carries no symref capability,
            // so push sessions make one bounded upload-pack fetch.
            GitService::ReceivePack => fetch_aux_head_symref(state, &session, &auth).await,
        };
        if let Some(branch) = discovered {
            if GitSessionRepo::set_default_branch(&state.pool, session.id, &branch).await? {
                tracing::info!(
                    session_id = session.id,
                    default_branch = %branch,
                    "Default branch discovered"
                );
            }
        }
    }

    let mut out = Response::new(Body::from(body));
    *out.status_mut() = status;
    if let Some(value) = content_type {
        out.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(out)
}

/// `POST {repo}/git-upload-pack`: stream the negotiation through both ways.
pub async fn upload_pack(
    state: &AppState,
    id: DbId,
    secret: &str,
    body: Body,
) -> AppResult<Response> {
    let session = gate(state, id, secret, GitService::UploadPack).await?;
    let auth = git_auth(state, &session).await?;
    let url = rpc_url(&session, "git-upload-pack")?;

    let capped = count_and_cap(body.into_data_stream(), state.config.git_byte_cap);
    let response = state
        .upstream
        .relay(WireRequest {
            method: reqwest::Method::POST,
            url,
            basic_auth: Some(auth),
            content_type: Some("application/x-git-upload-pack-request".to_string()),
            accept: Some("application/x-git-upload-pack-result".to_string()),
            body: Some(reqwest::Body::wrap_stream(capped)),
            timeout: git_timeout(state),
        })
        .await
        .map_err(wire_failure)?;

    Ok(relay_streaming(response, state.config.git_byte_cap))
}

/// `POST {repo}/git-receive-pack`: inspect the command section, then
/// forward byte-identical content or reject without forwarding.
pub async fn receive_pack(
    state: &AppState,
    id: DbId,
    secret: &str,
    body: Body,
) -> AppResult<Response> {
    let session = gate(state, id, secret, GitService::ReceivePack).await?;
    let auth = git_auth(state, &session).await?;
    let url = rpc_url(&session, "git-receive-pack")?;

    // Buffer exactly the command section: scan after each chunk until the
    // flush-pkt shows up, bounded by the prefix cap.
    let mut stream = body.into_data_stream();
    let mut buffered: Vec<u8> = Vec::new();
    let commands = loop {
        match scan_commands(&buffered) {
            Ok(CommandScan::Complete { commands, .. }) => break commands,
            Ok(CommandScan::Incomplete) => {}
            Err(wire) => {
                push_blocked(state, &session, "VALIDATION_ERROR", &wire.0).await;
                return Err(wire.into());
            }
        }
        if buffered.len() > state.config.push_prefix_cap {
            push_blocked(
                state,
                &session,
                "PUSH_PREFIX_TOO_LARGE",
                "command section exceeded the buffer cap",
            )
            .await;
            return Err(AppError::broker(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PUSH_PREFIX_TOO_LARGE",
                "command section exceeded the buffer cap before the flush packet",
            ));
        }
        match stream.next().await {
            Some(Ok(chunk)) => buffered.extend_from_slice(&chunk),
            Some(Err(error)) => {
                return Err(AppError::BadRequest(format!(
                    "push stream failed while buffering commands: {error}"
                )));
            }
            None => {
                push_blocked(
                    state,
                    &session,
                    "VALIDATION_ERROR",
                    "push body ended before the command terminator",
                )
                .await;
                return Err(AppError::broker(
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    "push body ended before the command terminator",
                ));
            }
        }
    };

    let policy = PushPolicy {
        allow_default_branch: session.allow_default_branch_push,
        default_branch: session.default_branch_ref.as_deref(),
    };
    if let Err(violation) = check_push_safety(&commands, &policy) {
        push_blocked(state, &session, violation.code, &violation.message).await;
        tracing::warn!(
            session_id = session.id,
            code = violation.code,
            "Push blocked before forwarding"
        );
        return Err(violation.into());
    }

    // Replay the inspected prefix, then hand the live remainder through.
    let replay = futures::stream::once(async move { Ok::<Bytes, axum::Error>(Bytes::from(buffered)) });
    let full_body = replay.chain(stream);
    let capped = count_and_cap(full_body, state.config.git_byte_cap);

    let response = state
        .upstream
        .relay(WireRequest {
            method: reqwest::Method::POST,
            url,
            basic_auth: Some(auth),
            content_type: Some("application/x-git-receive-pack-request".to_string()),
            accept: Some("application/x-git-receive-pack-result".to_string()),
            body: Some(reqwest::Body::wrap_stream(capped)),
            timeout: git_timeout(state),
        })
        .await
        .map_err(wire_failure)?;

    // The single write is consumed once the upstream has answered; a
    // transport failure above leaves the session active for a retry.
    if GitSessionRepo::mark_used(&state.pool, session.id).await? {
        record(
            &state.pool,
            "agent",
            None,
            "session.used",
            None,
            Some(session.id),
            json!({ "upstream_status": response.status().as_u16() }),
        )
        .await;
        tracing::info!(session_id = session.id, "Push forwarded; session used");
    }

    Ok(relay_streaming(response, state.config.git_byte_cap))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn session_status(row: &GitSession) -> AppResult<GitSessionStatus> {
    GitSessionStatus::from_id(row.status_id)
        .ok_or_else(|| AppError::InternalError(format!("unknown status id {}", row.status_id)))
}

async fn load_owner(state: &AppState, user_id: DbId) -> AppResult<User> {
    UserRepo::find_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::InternalError(format!("owner row {user_id} is missing")))
}

/// Expire a pending or approved session whose deadline has passed.
async fn expire_if_overdue(state: &AppState, row: GitSession) -> AppResult<GitSession> {
    let status = session_status(&row)?;
    let overdue = matches!(
        status,
        GitSessionStatus::PendingApproval | GitSessionStatus::Approved
    ) && row.approval_deadline < Utc::now();
    if !overdue {
        return Ok(row);
    }

    if GitSessionRepo::mark_expired_if_overdue(&state.pool, row.id).await? {
        record(
            &state.pool,
            "system",
            None,
            "session.expired",
            None,
            Some(row.id),
            json!({ "approval_deadline": row.approval_deadline }),
        )
        .await;
        tracing::info!(session_id = row.id, "Session expired on read");
    }
    GitSessionRepo::find_by_id(&state.pool, row.id)
        .await?
        .ok_or_else(|| AppError::InternalError("session row vanished during expiry".into()))
}

/// Repository paths look like `owner/repo[.git]`, possibly with deeper
/// grouping segments. Empty, dot, and percent-encoded segments are out.
fn validate_repo_path(path: &str) -> Result<String, CoreError> {
    let trimmed = path.trim_matches('/');
    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.len() < 2 {
        return Err(CoreError::Validation(
            "repository path must name an owner and a repository".into(),
        ));
    }
    for segment in &segments {
        if segment.is_empty() || *segment == "." || *segment == ".." {
            return Err(CoreError::Validation(
                "repository path contains an empty or traversal segment".into(),
            ));
        }
        if segment.contains('%') {
            return Err(CoreError::Validation(
                "repository path must not be percent-encoded".into(),
            ));
        }
    }
    Ok(segments.join("/"))
}

/// Resolve provider Git credentials for a session's upstream host.
async fn git_auth(state: &AppState, session: &GitSession) -> AppResult<(String, String)> {
    let provider = state.providers.by_id(&session.provider).ok_or_else(|| {
        AppError::InternalError(format!(
            "provider {} is no longer configured",
            session.provider
        ))
    })?;
    let credential = find_credential(state, session.user_id, &session.provider).await?;
    let access_secret = unlock_access_secret(state, &credential, &session.provider).await?;
    provider.git_credentials(&access_secret).ok_or_else(|| {
        AppError::InternalError(format!(
            "provider {} has no Git credential mapping",
            session.provider
        ))
    })
}

fn rpc_url(session: &GitSession, tail: &str) -> AppResult<Url> {
    Url::parse(&format!(
        "{}/{}",
        session.repo_url.trim_end_matches('/'),
        tail
    ))
    .map_err(|_| AppError::InternalError("stored repository URL failed to parse".into()))
}

fn git_timeout(state: &AppState) -> Duration {
    Duration::from_secs(state.config.git_upstream_timeout_secs)
}

fn wire_failure(failure: UpstreamFailure) -> AppError {
    let status = match failure {
        UpstreamFailure::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    };
    AppError::broker(status, failure.code(), failure.to_string())
}

/// One bounded upload-pack advertisement fetch, for push sessions whose
/// default branch is still unknown. Best effort: failures only log.
async fn fetch_aux_head_symref(
    state: &AppState,
    session: &GitSession,
    auth: &(String, String),
) -> Option<String> {
    let url = rpc_url(session, "info/refs?service=git-upload-pack").ok()?;
    let result = state
        .upstream
        .relay(WireRequest {
            method: reqwest::Method::GET,
            url,
            basic_auth: Some(auth.clone()),
            content_type: None,
            accept: None,
            body: None,
            timeout: git_timeout(state),
        })
        .await;
    match result {
        Ok(response) => match collect_capped(response, state.config.git_byte_cap).await {
            Ok(body) => discover_head_symref(&body),
            Err(error) => {
                tracing::warn!(
                    session_id = session.id,
                    error = %error,
                    "Auxiliary ref advertisement read failed"
                );
                None
            }
        },
        Err(error) => {
            tracing::warn!(
                session_id = session.id,
                error = %error,
                "Auxiliary ref advertisement fetch failed"
            );
            None
        }
    }
}

async fn push_blocked(state: &AppState, session: &GitSession, code: &str, message: &str) {
    record(
        &state.pool,
        "agent",
        None,
        "session.push_blocked",
        None,
        Some(session.id),
        json!({ "code": code, "message": message }),
    )
    .await;
}

/// Compose the owner-facing prompt for a fresh session.
fn build_session_prompt(owner: &User, caller: &AuthCaller, row: &GitSession) -> ApprovalPrompt {
    let mut lines = vec![
        format!("git {} {}", row.operation, row.repo_url),
        format!("Caller key: {} ({}…)", caller.key_label, caller.key_prefix),
    ];
    if let Some(address) = &caller.address {
        lines.push(format!("From: {address}"));
    }
    if row.is_push() {
        lines.push("Deletions and tag updates are always blocked.".to_string());
        lines.push(
            "Default-branch pushes stay blocked unless you allow them when approving."
                .to_string(),
        );
    }
    if let Some(hint) = &row.consent_hint {
        lines.push(format!("Agent note: {}", clip(hint, 1024)));
    }

    ApprovalPrompt {
        recipient: owner.channel_identity.clone(),
        kind: PromptKind::GitSession,
        subject_id: row.id,
        title: format!("Git {} approval: {}", row.operation, row.repo_path),
        lines,
    }
}

/// Relay a streamed upstream response, capping the relayed bytes.
fn relay_streaming(response: reqwest::Response, byte_cap: u64) -> Response {
    let status = response.status();
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let stream = count_and_cap(response.bytes_stream(), byte_cap);
    let mut out = Response::new(Body::from_stream(stream));
    *out.status_mut() = status;
    if let Some(value) = content_type {
        out.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    out
}
