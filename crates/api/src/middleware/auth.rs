use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use drawbridge_core::error::CoreError;
use drawbridge_core::hashing::sha256_hex;
use drawbridge_db::repositories::ApiKeyRepo;
use drawbridge_db::DbId;

use crate::error::AppError;
use crate::state::AppState;

/// Authenticated agent caller, resolved from a bearer API key.
///
/// Extracting this from a request verifies the `Authorization: Bearer` header
/// against the active key table and records key usage. Handlers that take an
/// [`AuthCaller`] argument are therefore key-gated.
#[derive(Debug, Clone)]
pub struct AuthCaller {
    pub user_id: DbId,
    pub api_key_id: DbId,
    pub key_label: String,
    pub key_prefix: String,
    /// Socket-level caller address when a proxy forwarded it, used for
    /// auto-approval rule matching and prompt context only.
    pub address: Option<String>,
}

impl FromRequestParts<AppState> for AuthCaller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                CoreError::Unauthorized("Missing Authorization header".to_string())
            })?;

        let token = header.strip_prefix("Bearer ").ok_or_else(|| {
            CoreError::Unauthorized("Authorization header must use the Bearer scheme".to_string())
        })?;

        let key_hash = sha256_hex(token.trim().as_bytes());
        let api_key = ApiKeyRepo::find_by_hash(&state.pool, &key_hash)
            .await?
            .ok_or_else(|| CoreError::Unauthorized("Unknown or revoked API key".to_string()))?;

        if let Err(error) = ApiKeyRepo::touch_last_used(&state.pool, api_key.id).await {
            tracing::debug!(api_key_id = api_key.id, error = %error, "Failed to record key usage");
        }

        let address = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        Ok(AuthCaller {
            user_id: api_key.user_id,
            api_key_id: api_key.id,
            key_label: api_key.label,
            key_prefix: api_key.key_prefix,
            address,
        })
    }
}
