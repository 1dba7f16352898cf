//! Credential acquisition shared by the REST executor and the Git proxy.
//!
//! Both paths resolve the owner's linked credential for the matched
//! provider and decrypt it in memory for the duration of one upstream
//! call. Expired access tokens are refreshed through the OAuth broker
//! first; a credential that cannot be refreshed fails the call without
//! consuming the approval.

use axum::http::StatusCode;
use chrono::Utc;
use drawbridge_db::models::credential::LinkedCredential;
use drawbridge_db::repositories::CredentialRepo;
use drawbridge_db::DbId;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Find the live credential linking this owner to a provider.
pub(crate) async fn find_credential(
    state: &AppState,
    user_id: DbId,
    provider_id: &str,
) -> AppResult<LinkedCredential> {
    CredentialRepo::find_active(&state.pool, user_id, provider_id)
        .await?
        .ok_or_else(|| {
            AppError::broker(
                StatusCode::FORBIDDEN,
                "NO_LINKED_CREDENTIAL",
                format!("no linked {provider_id} credential for this account"),
            )
        })
}

/// Decrypt the access secret, refreshing it first if it has expired.
pub(crate) async fn unlock_access_secret(
    state: &AppState,
    credential: &LinkedCredential,
    provider_id: &str,
) -> AppResult<String> {
    let expired = credential
        .expires_at
        .is_some_and(|expires_at| expires_at <= Utc::now());
    if !expired {
        return Ok(state.cipher.decrypt(&credential.secret_ciphertext)?);
    }

    let Some(refresh_ciphertext) = credential.refresh_ciphertext.as_deref() else {
        return Err(AppError::broker(
            StatusCode::BAD_GATEWAY,
            "CREDENTIAL_REFRESH_FAILED",
            "the stored credential has expired and has no refresh token",
        ));
    };
    let refresh_token = state.cipher.decrypt(refresh_ciphertext)?;

    let refreshed = match state.oauth.refresh(provider_id, &refresh_token).await {
        Ok(token) => token,
        Err(error) => {
            tracing::warn!(
                credential_id = credential.id,
                provider = %provider_id,
                error = %error,
                "Credential refresh failed"
            );
            return Err(AppError::broker(
                StatusCode::BAD_GATEWAY,
                "CREDENTIAL_REFRESH_FAILED",
                "the provider declined to refresh the stored credential",
            ));
        }
    };

    let secret_ciphertext = state.cipher.encrypt(&refreshed.access_token)?;
    let new_refresh_ciphertext = match &refreshed.refresh_token {
        Some(token) => Some(state.cipher.encrypt(token)?),
        None => None,
    };
    CredentialRepo::update_access_secret(
        &state.pool,
        credential.id,
        &secret_ciphertext,
        new_refresh_ciphertext.as_deref(),
        refreshed.expires_at,
    )
    .await?;

    tracing::info!(
        credential_id = credential.id,
        provider = %provider_id,
        "Access credential refreshed"
    );
    Ok(refreshed.access_token)
}
