//! Decision-channel callback handlers.
//!
//! This surface is reached by the trusted chat collaborator, not by
//! agents: owner registration, caller key management, credential
//! linking, rule revocation, and the decisions themselves. Every
//! handler authenticates with the shared channel token via
//! [`ChannelAuth`].

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use drawbridge_core::error::CoreError;
use drawbridge_core::secrets::mint_api_key;
use drawbridge_db::models::api_key::{ApiKeyCreatedResponse, CreateApiKey, RenameApiKey};
use drawbridge_db::models::approval::DecisionRequest;
use drawbridge_db::models::credential::LinkCredential;
use drawbridge_db::models::user::UpsertUser;
use drawbridge_db::repositories::{
    ApiKeyRepo, AuditRepo, CredentialRepo, GitSessionRepo, RequestRepo, RuleRepo, UserRepo,
};
use drawbridge_db::DbId;
use serde_json::json;

use crate::engine;
use crate::error::{AppError, AppResult};
use crate::handlers::git_sessions::SessionView;
use crate::handlers::requests::RequestView;
use crate::middleware::ChannelAuth;
use crate::response::DataResponse;
use crate::state::AppState;

const LABEL_MAX: usize = 64;

fn validate_label(label: &str) -> AppResult<&str> {
    let label = label.trim();
    if label.is_empty() || label.len() > LABEL_MAX {
        return Err(AppError::BadRequest(format!(
            "label must be 1-{LABEL_MAX} characters"
        )));
    }
    Ok(label)
}

// ---------------------------------------------------------------------------
// Owners
// ---------------------------------------------------------------------------

/// POST /channel/users
///
/// Register an owner on first contact, or refresh their display name.
pub async fn upsert_user(
    _: ChannelAuth,
    State(state): State<AppState>,
    Json(input): Json<UpsertUser>,
) -> AppResult<impl IntoResponse> {
    let identity = input.channel_identity.trim();
    if identity.is_empty() {
        return Err(AppError::BadRequest(
            "channel_identity must not be empty".to_string(),
        ));
    }

    let user = UserRepo::upsert(&state.pool, identity, input.display_name.as_deref()).await?;
    tracing::info!(user_id = user.id, "Upserted channel user");
    Ok(Json(DataResponse::new(user)))
}

// ---------------------------------------------------------------------------
// Caller keys
// ---------------------------------------------------------------------------

/// POST /channel/users/{id}/keys
///
/// Mint a caller key. The plaintext appears in this response and
/// nowhere else.
pub async fn create_key(
    _: ChannelAuth,
    State(state): State<AppState>,
    Path(user_id): Path<DbId>,
    Json(input): Json<CreateApiKey>,
) -> AppResult<impl IntoResponse> {
    let label = validate_label(&input.label)?;
    let user = UserRepo::find_by_id(&state.pool, user_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "user",
            id: user_id,
        })?;

    let minted = mint_api_key();
    let key = ApiKeyRepo::create(&state.pool, user.id, label, &minted.prefix, &minted.hash).await?;

    tracing::info!(
        api_key_id = key.id,
        user_id = user.id,
        key_prefix = %key.key_prefix,
        "Minted caller API key"
    );

    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(ApiKeyCreatedResponse {
            id: key.id,
            label: key.label,
            key_prefix: key.key_prefix,
            plaintext_key: minted.plaintext,
            created_at: key.created_at,
        })),
    ))
}

/// GET /channel/users/{id}/keys
pub async fn list_keys(
    _: ChannelAuth,
    State(state): State<AppState>,
    Path(user_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let keys = ApiKeyRepo::list_for_user(&state.pool, user_id).await?;
    Ok(Json(DataResponse::new(keys)))
}

/// POST /channel/keys/{id}/rename
pub async fn rename_key(
    _: ChannelAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<RenameApiKey>,
) -> AppResult<impl IntoResponse> {
    let label = validate_label(&input.label)?;
    let key = ApiKeyRepo::rename(&state.pool, id, label)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "api key",
            id,
        })?;
    Ok(Json(DataResponse::new(key)))
}

/// POST /channel/keys/{id}/revoke
pub async fn revoke_key(
    _: ChannelAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let key = ApiKeyRepo::revoke(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "api key",
            id,
        })?;
    tracing::info!(api_key_id = key.id, key_prefix = %key.key_prefix, "Revoked caller API key");
    Ok(Json(DataResponse::new(key)))
}

/// POST /channel/keys/{id}/rotate
///
/// Revoke the key and mint a successor under the same label.
pub async fn rotate_key(
    _: ChannelAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let minted = mint_api_key();
    let key = ApiKeyRepo::rotate(&state.pool, id, &minted.prefix, &minted.hash)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "api key",
            id,
        })?;

    tracing::info!(
        api_key_id = key.id,
        rotated_from_id = id,
        key_prefix = %key.key_prefix,
        "Rotated caller API key"
    );

    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(ApiKeyCreatedResponse {
            id: key.id,
            label: key.label,
            key_prefix: key.key_prefix,
            plaintext_key: minted.plaintext,
            created_at: key.created_at,
        })),
    ))
}

// ---------------------------------------------------------------------------
// Linked credentials
// ---------------------------------------------------------------------------

/// PUT /channel/users/{id}/credentials/{provider}
///
/// Link (or replace) a provider credential. The secret is encrypted
/// before it touches the database and never appears in the response.
pub async fn link_credential(
    _: ChannelAuth,
    State(state): State<AppState>,
    Path((user_id, provider)): Path<(DbId, String)>,
    Json(input): Json<LinkCredential>,
) -> AppResult<impl IntoResponse> {
    if state.providers.by_id(&provider).is_none() {
        return Err(CoreError::Validation(format!("unknown provider {provider}")).into());
    }
    if input.secret.is_empty() {
        return Err(AppError::BadRequest("secret must not be empty".to_string()));
    }
    let user = UserRepo::find_by_id(&state.pool, user_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "user",
            id: user_id,
        })?;

    let secret_ciphertext = state.cipher.encrypt(&input.secret)?;
    let refresh_ciphertext = input
        .refresh_secret
        .as_deref()
        .map(|s| state.cipher.encrypt(s))
        .transpose()?;

    let credential = CredentialRepo::upsert(
        &state.pool,
        user.id,
        &provider,
        &secret_ciphertext,
        refresh_ciphertext.as_deref(),
        input.granted_scope.as_ref(),
        input.expires_at,
    )
    .await?;

    engine::record(
        &state.pool,
        "owner",
        Some(&user.channel_identity),
        "credential.linked",
        None,
        None,
        json!({ "provider": provider, "has_refresh": refresh_ciphertext.is_some() }),
    )
    .await;

    tracing::info!(user_id = user.id, provider = %provider, "Linked provider credential");
    Ok(Json(DataResponse::new(credential)))
}

/// DELETE /channel/users/{id}/credentials/{provider}
pub async fn revoke_credential(
    _: ChannelAuth,
    State(state): State<AppState>,
    Path((user_id, provider)): Path<(DbId, String)>,
) -> AppResult<impl IntoResponse> {
    let credential = CredentialRepo::revoke(&state.pool, user_id, &provider)
        .await?
        .ok_or_else(|| {
            AppError::broker(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("no active credential for provider {provider}"),
            )
        })?;

    engine::record(
        &state.pool,
        "owner",
        None,
        "credential.revoked",
        None,
        None,
        json!({ "provider": provider }),
    )
    .await;

    tracing::info!(user_id = user_id, provider = %provider, "Revoked provider credential");
    Ok(Json(DataResponse::new(credential)))
}

// ---------------------------------------------------------------------------
// Always-allow rules
// ---------------------------------------------------------------------------

/// GET /channel/users/{id}/rules
pub async fn list_rules(
    _: ChannelAuth,
    State(state): State<AppState>,
    Path(user_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let rules = RuleRepo::list_for_user(&state.pool, user_id).await?;
    Ok(Json(DataResponse::new(rules)))
}

/// POST /channel/rules/{id}/revoke
pub async fn revoke_rule(
    _: ChannelAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let rule = RuleRepo::revoke(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound { entity: "rule", id })?;

    engine::record(
        &state.pool,
        "owner",
        None,
        "rule.revoked",
        rule.created_from_request_id,
        None,
        json!({
            "method": rule.method,
            "upstream_host": rule.upstream_host,
            "upstream_path": rule.upstream_path,
        }),
    )
    .await;

    tracing::info!(rule_id = rule.id, "Revoked always-allow rule");
    Ok(Json(DataResponse::new(rule)))
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// POST /channel/requests/{id}/decision
pub async fn decide_request(
    _: ChannelAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<DecisionRequest>,
) -> AppResult<impl IntoResponse> {
    let row = engine::requests::decide(&state, id, &input).await?;
    Ok(Json(DataResponse::new(RequestView::from(&row))))
}

/// POST /channel/sessions/{id}/decision
pub async fn decide_session(
    _: ChannelAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<DecisionRequest>,
) -> AppResult<impl IntoResponse> {
    let row = engine::git::decide(&state, id, &input).await?;
    Ok(Json(DataResponse::new(SessionView::from(&row))))
}

// ---------------------------------------------------------------------------
// Audit trails
// ---------------------------------------------------------------------------

/// GET /channel/requests/{id}/audit
pub async fn request_audit(
    _: ChannelAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    RequestRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "request",
            id,
        })?;
    let events = AuditRepo::list_for_request(&state.pool, id).await?;
    Ok(Json(DataResponse::new(events)))
}

/// GET /channel/sessions/{id}/audit
pub async fn session_audit(
    _: ChannelAuth,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    GitSessionRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "git session",
            id,
        })?;
    let events = AuditRepo::list_for_session(&state.pool, id).await?;
    Ok(Json(DataResponse::new(events)))
}
