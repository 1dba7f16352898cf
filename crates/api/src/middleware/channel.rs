use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use drawbridge_core::hashing::constant_time_eq;
use drawbridge_core::error::CoreError;

use crate::error::AppError;
use crate::state::AppState;

/// Guard for the channel management surface.
///
/// The approval channel backend authenticates with a single shared bearer
/// token configured at startup. Agent API keys are never accepted here.
#[derive(Debug, Clone, Copy)]
pub struct ChannelAuth;

impl FromRequestParts<AppState> for ChannelAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.channel_token.as_deref() else {
            return Err(AppError::broker(
                StatusCode::INTERNAL_SERVER_ERROR,
                "CONFIG_MISSING",
                "Channel token is not configured",
            ));
        };

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

        if !constant_time_eq(token.trim(), expected) {
            return Err(CoreError::Unauthorized("Invalid channel token".to_string()).into());
        }

        Ok(ChannelAuth)
    }
}
