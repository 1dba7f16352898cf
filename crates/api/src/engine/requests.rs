//! Brokered REST request lifecycle.
//!
//! Capture freezes the caller's request into a canonical row, the owner
//! decides over the channel, and execution replays the frozen row against
//! the upstream at most once. Every transition appends an audit event.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::Response;
use chrono::Utc;
use drawbridge_core::canonical::{canonicalize, hash_prefix, CanonicalRequest};
use drawbridge_core::error::CoreError;
use drawbridge_db::models::approval::DecisionRequest;
use drawbridge_db::models::proxy_request::{CreateProxyRequest, NewProxyRequest, ProxyRequest};
use drawbridge_db::models::status::RequestStatus;
use drawbridge_db::models::user::User;
use drawbridge_db::repositories::{RequestRepo, RuleRepo, UserRepo};
use drawbridge_db::DbId;
use serde_json::json;
use url::Url;

use crate::channel::{ApprovalPrompt, PromptKind};
use crate::error::{is_unique_violation, AppError, AppResult};
use crate::middleware::AuthCaller;
use crate::providers::{check_header_allowed, Provider};
use crate::state::AppState;

use super::credentials::{find_credential, unlock_access_secret};
use super::upstream::{PreparedRequest, UpstreamFailure, UpstreamLimits};
use super::{clip, record};

/// Retry-After value while a request awaits its decision.
pub const DECISION_RETRY_AFTER_SECS: u64 = 5;
/// Retry-After value while another call holds the execution claim.
pub const EXECUTION_RETRY_AFTER_SECS: u64 = 2;

/// Longest idempotency key accepted at capture.
const IDEMPOTENCY_KEY_MAX: usize = 255;
/// Consent hints are stored intact but clipped to this many characters
/// in prompts and notices.
const HINT_PROMPT_MAX: usize = 1024;
/// Query strings shown in prompts are cut at this many characters; the
/// integrity hash still covers the whole request.
const QUERY_PROMPT_MAX: usize = 256;

/// How a create call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateDisposition {
    /// New capture, owner prompted.
    Fresh,
    /// New capture, approved immediately by a saved rule.
    AutoApproved,
    /// An earlier capture with the same idempotency key was returned.
    Replayed,
}

/// Capture a request: canonicalize, persist, and prompt the owner.
pub async fn create(
    state: &AppState,
    caller: &AuthCaller,
    input: CreateProxyRequest,
) -> AppResult<(ProxyRequest, CreateDisposition)> {
    let headers: Vec<(String, String)> = input
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    let canonical = canonicalize(
        &input.method,
        &input.url,
        &headers,
        input.body,
        state.config.allow_http_upstream,
    )?;

    let provider = state
        .providers
        .for_rest_host(&canonical.host)
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "no provider is configured for host {}",
                canonical.host
            ))
        })?;

    if !provider.allowed_methods().contains(&canonical.method.as_str()) {
        return Err(CoreError::Validation(format!(
            "method {} is not allowed for {}",
            canonical.method,
            provider.id()
        ))
        .into());
    }
    for (name, _) in &canonical.headers {
        check_header_allowed(provider, name)?;
    }
    provider.allows_url(&canonical.url)?;

    if let Some(key) = input.idempotency_key.as_deref() {
        if key.is_empty() || key.chars().count() > IDEMPOTENCY_KEY_MAX {
            return Err(CoreError::Validation(format!(
                "idempotency key must be between 1 and {IDEMPOTENCY_KEY_MAX} characters"
            ))
            .into());
        }
        // Replay: the original capture answers for every retry of the
        // same key, without a second prompt.
        if let Some(existing) =
            RequestRepo::find_by_idempotency(&state.pool, caller.api_key_id, key).await?
        {
            return Ok((existing, CreateDisposition::Replayed));
        }
    }

    let owner = load_owner(state, caller.user_id).await?;
    let integrity_hash = canonical.integrity_hash();
    let deadline = Utc::now() + chrono::Duration::seconds(state.config.approval_ttl_secs);

    let new_request = NewProxyRequest {
        user_id: caller.user_id,
        api_key_id: caller.api_key_id,
        key_label_snapshot: &caller.key_label,
        caller_address: caller.address.as_deref(),
        provider: provider.id(),
        method: &canonical.method,
        canonical_url: canonical.url.as_str(),
        upstream_host: &canonical.host,
        upstream_path: &canonical.path,
        headers_json: canonical.headers_json(),
        body: canonical.body.as_deref(),
        integrity_hash: &integrity_hash,
        idempotency_key: input.idempotency_key.as_deref(),
        consent_hint: input.consent_hint.as_deref(),
        approval_deadline: deadline,
    };

    let row = match RequestRepo::create(&state.pool, &new_request).await {
        Ok(row) => row,
        // Two captures raced on the same idempotency key; the winner's
        // row answers for both.
        Err(err) if is_unique_violation(&err, "uq_proxy_requests_key_idempotency") => {
            let key = input.idempotency_key.as_deref().unwrap_or_default();
            let existing =
                RequestRepo::find_by_idempotency(&state.pool, caller.api_key_id, key)
                    .await?
                    .ok_or_else(|| {
                        AppError::InternalError("idempotent winner row missing".into())
                    })?;
            return Ok((existing, CreateDisposition::Replayed));
        }
        Err(err) => return Err(err.into()),
    };

    let rule = RuleRepo::find_match(
        &state.pool,
        caller.user_id,
        caller.api_key_id,
        caller.address.as_deref().unwrap_or(""),
        &row.method,
        &row.upstream_host,
        &row.upstream_path,
    )
    .await?;

    if let Some(rule) = rule {
        let decided = RequestRepo::decide(
            &state.pool,
            row.id,
            RequestStatus::Approved,
            &owner.channel_identity,
            "approve",
            None,
            Some(rule.id),
        )
        .await?
        .ok_or_else(|| AppError::InternalError("fresh capture lost its decision race".into()))?;

        record(
            &state.pool,
            "system",
            None,
            "request.auto_approved",
            Some(row.id),
            None,
            json!({ "rule_id": rule.id, "integrity_hash": decided.integrity_hash }),
        )
        .await;

        let notice = format!(
            "Auto-approved by your saved rule: {} {}",
            decided.method, decided.canonical_url
        );
        if let Err(error) = state.channel.notify(&owner.channel_identity, &notice).await {
            tracing::warn!(request_id = row.id, error = %error, "Auto-approval notice failed");
        }

        tracing::info!(
            request_id = row.id,
            rule_id = rule.id,
            provider = %decided.provider,
            "Request auto-approved by rule"
        );
        return Ok((decided, CreateDisposition::AutoApproved));
    }

    let prompt = build_prompt(&owner, caller, provider, &canonical, &row);
    match state.channel.prompt_request(&prompt).await {
        Ok(Some(message_ref)) => {
            RequestRepo::set_prompt_ref(&state.pool, row.id, &message_ref).await?;
        }
        Ok(None) => {}
        Err(error) => {
            tracing::warn!(request_id = row.id, error = %error, "Approval prompt delivery failed");
        }
    }

    record(
        &state.pool,
        "agent",
        Some(&caller.key_prefix),
        "request.created",
        Some(row.id),
        None,
        json!({
            "method": row.method,
            "upstream_host": row.upstream_host,
            "integrity_hash": row.integrity_hash,
        }),
    )
    .await;

    tracing::info!(
        request_id = row.id,
        provider = %row.provider,
        method = %row.method,
        upstream_host = %row.upstream_host,
        "Request captured and owner prompted"
    );
    Ok((row, CreateDisposition::Fresh))
}

/// Load a request for the caller that created it, applying lazy expiry.
pub async fn load_owned(
    state: &AppState,
    caller: &AuthCaller,
    id: DbId,
) -> AppResult<ProxyRequest> {
    let row = RequestRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "request",
            id,
        })?;

    if row.api_key_id != caller.api_key_id {
        return Err(CoreError::Forbidden(
            "request was created by a different API key".into(),
        )
        .into());
    }

    expire_if_overdue(state, row).await
}

/// Record the owner's decision arriving over the channel.
pub async fn decide(
    state: &AppState,
    id: DbId,
    input: &DecisionRequest,
) -> AppResult<ProxyRequest> {
    if input.decision != "approve" && input.decision != "deny" {
        return Err(AppError::BadRequest(
            "decision must be approve or deny".to_string(),
        ));
    }

    let row = RequestRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "request",
            id,
        })?;
    let owner = load_owner(state, row.user_id).await?;

    if input.decider_identity != owner.channel_identity {
        return Err(CoreError::Forbidden(
            "only the account owner may decide this request".into(),
        )
        .into());
    }

    let row = expire_if_overdue(state, row).await?;
    let status = request_status(&row)?;
    if status == RequestStatus::Expired {
        return Err(AppError::broker(
            StatusCode::REQUEST_TIMEOUT,
            "APPROVAL_EXPIRED",
            "the approval window elapsed before a decision was recorded",
        ));
    }
    if status != RequestStatus::PendingApproval {
        return Err(AppError::broker(
            StatusCode::CONFLICT,
            "NOT_PENDING",
            format!("request is {} and no longer accepts decisions", status.name()),
        ));
    }

    let to = if input.is_approve() {
        RequestStatus::Approved
    } else {
        RequestStatus::Denied
    };
    let decided = RequestRepo::decide(
        &state.pool,
        row.id,
        to,
        &input.decider_identity,
        &input.decision,
        input.message_ref.as_deref(),
        None,
    )
    .await?
    .ok_or_else(|| {
        AppError::broker(
            StatusCode::CONFLICT,
            "ALREADY_DECIDED",
            "another decision won the race for this request",
        )
    })?;

    if input.is_approve() && input.always_allow {
        let rule = RuleRepo::upsert(
            &state.pool,
            decided.user_id,
            decided.api_key_id,
            decided.caller_address.as_deref().unwrap_or(""),
            &decided.method,
            &decided.upstream_host,
            &decided.upstream_path,
            decided.id,
        )
        .await?;
        record(
            &state.pool,
            "owner",
            Some(&input.decider_identity),
            "rule.created",
            Some(decided.id),
            None,
            json!({
                "rule_id": rule.id,
                "method": rule.method,
                "upstream_host": rule.upstream_host,
                "upstream_path": rule.upstream_path,
            }),
        )
        .await;
    }

    let event = if input.is_approve() {
        "request.approved"
    } else {
        "request.denied"
    };
    record(
        &state.pool,
        "owner",
        Some(&input.decider_identity),
        event,
        Some(decided.id),
        None,
        json!({ "message_ref": input.message_ref }),
    )
    .await;

    tracing::info!(
        request_id = decided.id,
        decision = %input.decision,
        "Request decided"
    );
    Ok(decided)
}

/// Execute an approved request: claim it, replay the frozen capture
/// against the upstream, and relay the outcome verbatim.
pub async fn execute(state: &AppState, caller: &AuthCaller, id: DbId) -> AppResult<Response> {
    let row = load_owned(state, caller, id).await?;
    let status = request_status(&row)?;
    if let Some(err) = execution_gate(status) {
        return Err(err);
    }

    let provider = state.providers.by_id(&row.provider).ok_or_else(|| {
        AppError::InternalError(format!("provider {} is no longer configured", row.provider))
    })?;
    let url = Url::parse(&row.canonical_url)
        .map_err(|_| AppError::InternalError("stored canonical URL failed to parse".into()))?;

    // Pre-claim checks leave the request approved and retryable.
    let credential = find_credential(state, row.user_id, &row.provider).await?;
    provider.check_scope(&url, credential.granted_scope.as_ref())?;
    let access_secret = unlock_access_secret(state, &credential, &row.provider).await?;

    let Some(claimed) = RequestRepo::claim_for_execution(&state.pool, row.id).await? else {
        // Lost the claim race; report whatever state the winner left.
        let current = RequestRepo::find_by_id(&state.pool, row.id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "request",
                id: row.id,
            })?;
        let status = request_status(&current)?;
        return Err(execution_gate(status).unwrap_or_else(|| {
            AppError::broker(
                StatusCode::CONFLICT,
                "CONFLICT",
                "request state changed during the execution claim",
            )
        }));
    };

    let prepared = prepare_upstream_request(provider, &claimed, &url, &access_secret)?;
    let limits = UpstreamLimits {
        timeout: Duration::from_secs(state.config.upstream_timeout_secs),
        byte_cap: state.config.upstream_byte_cap,
        max_redirects: state.config.max_redirects,
        allow_http: state.config.allow_http_upstream,
    };
    let allow_host = |target: &Url| {
        target
            .host_str()
            .map(|host| provider.matches_rest_host(&host.to_ascii_lowercase()))
            .unwrap_or(false)
    };

    match state.upstream.execute(&prepared, &limits, &allow_host).await {
        Ok(response) => {
            let succeeded = response.status.is_success();
            let (final_status, error_code) = if succeeded {
                (RequestStatus::Succeeded, None)
            } else {
                (
                    RequestStatus::Failed,
                    Some(format!("UPSTREAM_HTTP_{}", response.status.as_u16())),
                )
            };
            let settled = RequestRepo::finish_execution(
                &state.pool,
                claimed.id,
                final_status,
                Some(response.status.as_u16() as i16),
                response.content_type.as_deref(),
                Some(response.body.len() as i64),
                error_code.as_deref(),
                None,
            )
            .await?;
            if !settled {
                tracing::warn!(request_id = claimed.id, "Execution claim vanished before settling");
            }

            let event = if succeeded {
                "request.executed"
            } else {
                "request.execution_failed"
            };
            record(
                &state.pool,
                "agent",
                Some(&caller.key_prefix),
                event,
                Some(claimed.id),
                None,
                json!({
                    "upstream_status": response.status.as_u16(),
                    "response_bytes": response.body.len(),
                    "error_code": error_code,
                }),
            )
            .await;

            tracing::info!(
                request_id = claimed.id,
                upstream_status = response.status.as_u16(),
                response_bytes = response.body.len(),
                "Request executed"
            );
            Ok(relay_response(response))
        }
        Err(failure) => {
            let message = failure.to_string();
            RequestRepo::finish_execution(
                &state.pool,
                claimed.id,
                RequestStatus::Failed,
                None,
                None,
                None,
                Some(failure.code()),
                Some(&message),
            )
            .await?;
            record(
                &state.pool,
                "agent",
                Some(&caller.key_prefix),
                "request.execution_failed",
                Some(claimed.id),
                None,
                json!({ "error_code": failure.code() }),
            )
            .await;

            tracing::warn!(
                request_id = claimed.id,
                error_code = failure.code(),
                "Upstream exchange failed"
            );
            let status = match failure {
                UpstreamFailure::Timeout => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            };
            Err(AppError::broker(status, failure.code(), message))
        }
    }
}

/// Map a non-approved status to the execute-time error, if any.
fn execution_gate(status: RequestStatus) -> Option<AppError> {
    match status {
        RequestStatus::Approved => None,
        RequestStatus::PendingApproval => Some(AppError::broker(
            StatusCode::CONFLICT,
            "NOT_APPROVED",
            "the request has not been approved yet",
        )),
        RequestStatus::Denied => Some(AppError::broker(
            StatusCode::FORBIDDEN,
            "DENIED",
            "the owner denied this request",
        )),
        RequestStatus::Expired => Some(AppError::broker(
            StatusCode::REQUEST_TIMEOUT,
            "APPROVAL_EXPIRED",
            "the approval window elapsed before execution",
        )),
        RequestStatus::Executing => Some(AppError::broker_retry(
            StatusCode::CONFLICT,
            "EXECUTION_IN_PROGRESS",
            "another call is executing this request",
            EXECUTION_RETRY_AFTER_SECS,
        )),
        RequestStatus::Succeeded | RequestStatus::Failed => Some(AppError::broker(
            StatusCode::GONE,
            "ALREADY_EXECUTED",
            "this request has already been executed",
        )),
    }
}

/// Resolve the owner row behind a caller or capture.
async fn load_owner(state: &AppState, user_id: DbId) -> AppResult<User> {
    UserRepo::find_by_id(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::InternalError(format!("owner row {user_id} is missing")))
}

fn request_status(row: &ProxyRequest) -> AppResult<RequestStatus> {
    RequestStatus::from_id(row.status_id)
        .ok_or_else(|| AppError::InternalError(format!("unknown status id {}", row.status_id)))
}

/// Expire a pending or approved row whose deadline has passed, then
/// return the fresh row.
async fn expire_if_overdue(state: &AppState, row: ProxyRequest) -> AppResult<ProxyRequest> {
    let status = request_status(&row)?;
    let overdue = matches!(
        status,
        RequestStatus::PendingApproval | RequestStatus::Approved
    ) && row.approval_deadline < Utc::now();
    if !overdue {
        return Ok(row);
    }

    if RequestRepo::mark_expired_if_overdue(&state.pool, row.id).await? {
        record(
            &state.pool,
            "system",
            None,
            "request.expired",
            Some(row.id),
            None,
            json!({ "approval_deadline": row.approval_deadline }),
        )
        .await;
        tracing::info!(request_id = row.id, "Request expired on read");
    }
    RequestRepo::find_by_id(&state.pool, row.id)
        .await?
        .ok_or_else(|| AppError::InternalError("request row vanished during expiry".into()))
}

/// Compose the owner-facing prompt for a fresh capture. Shows host and
/// path with the query cut short; the full request is represented by
/// the hash prefix, not by dumping it into a chat message.
fn build_prompt(
    owner: &User,
    caller: &AuthCaller,
    provider: &dyn Provider,
    canonical: &CanonicalRequest,
    row: &ProxyRequest,
) -> ApprovalPrompt {
    let mut lines = vec![
        format!("{} {}{}", canonical.method, row.upstream_host, row.upstream_path),
        format!("Caller key: {} ({}…)", caller.key_label, caller.key_prefix),
    ];
    if let Some(query) = canonical.truncated_query(QUERY_PROMPT_MAX) {
        lines.push(format!("Query: {query}"));
    }
    if let Some(address) = &caller.address {
        lines.push(format!("From: {address}"));
    }
    if let Some(summary) = provider.describe_rest(&canonical.method, &row.upstream_path) {
        lines.push(format!("Reads as: {summary}"));
    }
    if let Some(body) = &row.body {
        lines.push(format!("Body: {} bytes", body.len()));
    }
    lines.push(format!("Integrity: {}", hash_prefix(&row.integrity_hash)));
    if let Some(hint) = &row.consent_hint {
        lines.push(format!("Agent note: {}", clip(hint, HINT_PROMPT_MAX)));
    }

    ApprovalPrompt {
        recipient: owner.channel_identity.clone(),
        kind: PromptKind::Request,
        subject_id: row.id,
        title: format!("Approval needed: {} {}", canonical.method, row.upstream_host),
        lines,
    }
}

/// Build the outbound request from the frozen capture. Stored headers are
/// re-filtered and the credential is injected fresh; a stored
/// `authorization` value could only exist through a bug and is dropped.
fn prepare_upstream_request(
    provider: &dyn Provider,
    row: &ProxyRequest,
    url: &Url,
    access_secret: &str,
) -> AppResult<PreparedRequest> {
    let method: reqwest::Method = row
        .method
        .parse()
        .map_err(|_| AppError::InternalError("stored method failed to parse".into()))?;

    let mut headers: Vec<(String, String)> = Vec::new();
    if let serde_json::Value::Object(map) = &row.headers_json {
        for (name, value) in map {
            if name == "authorization" {
                continue;
            }
            if let Some(text) = value.as_str() {
                headers.push((name.clone(), text.to_string()));
            }
        }
    }
    for (name, value) in provider.default_headers() {
        if !headers.iter().any(|(existing, _)| existing == name) {
            headers.push((name.to_string(), value.to_string()));
        }
    }
    headers.push(("authorization".to_string(), provider.auth_header(access_secret)));

    Ok(PreparedRequest {
        method,
        url: url.clone(),
        headers,
        body: row.body.clone(),
    })
}

/// Relay a buffered upstream response verbatim.
fn relay_response(response: super::upstream::UpstreamResponse) -> Response {
    let mut out = Response::new(axum::body::Body::from(response.body));
    *out.status_mut() = response.status;
    if let Some(content_type) = response.content_type {
        if let Ok(value) = axum::http::HeaderValue::from_str(&content_type) {
            out.headers_mut()
                .insert(axum::http::header::CONTENT_TYPE, value);
        }
    }
    out
}
