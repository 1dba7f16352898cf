//! OAuth token refresh for linked credentials.
//!
//! When a stored access secret has expired and the credential carries a
//! refresh token, the execution path exchanges it for a fresh access
//! token before touching the upstream. The broker sits behind a trait so
//! tests can stub the exchange.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use drawbridge_core::error::CoreError;
use drawbridge_core::types::Timestamp;
use serde::Deserialize;

/// Result of a refresh-token exchange.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Some providers rotate the refresh token on every exchange.
    pub refresh_token: Option<String>,
    pub expires_at: Option<Timestamp>,
}

/// Exchanges refresh tokens for fresh access tokens.
#[async_trait]
pub trait OAuthBroker: Send + Sync {
    async fn refresh(
        &self,
        provider: &str,
        refresh_token: &str,
    ) -> Result<RefreshedToken, CoreError>;
}

/// Per-provider token endpoint configuration.
struct TokenEndpoint {
    token_url: String,
    client_id: String,
    client_secret: String,
}

/// OAuth broker configured from `OAUTH_<PROVIDER>_*` environment variables.
///
/// Providers without a configured endpoint simply cannot refresh; their
/// executions fail with `CREDENTIAL_REFRESH_FAILED` once the access
/// token expires.
pub struct EnvOAuthBroker {
    client: reqwest::Client,
    endpoints: HashMap<String, TokenEndpoint>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

impl EnvOAuthBroker {
    /// Read endpoint configuration for the given provider ids.
    ///
    /// | Env Var | Meaning |
    /// |---------------------------------|----------------------------------|
    /// | `OAUTH_<PROVIDER>_TOKEN_URL` | Token endpoint URL |
    /// | `OAUTH_<PROVIDER>_CLIENT_ID` | OAuth client id |
    /// | `OAUTH_<PROVIDER>_CLIENT_SECRET`| OAuth client secret |
    pub fn from_env(provider_ids: &[&'static str]) -> Self {
        let mut endpoints = HashMap::new();
        for id in provider_ids {
            let upper = id.to_ascii_uppercase();
            let token_url = std::env::var(format!("OAUTH_{upper}_TOKEN_URL")).ok();
            let client_id = std::env::var(format!("OAUTH_{upper}_CLIENT_ID")).ok();
            let client_secret = std::env::var(format!("OAUTH_{upper}_CLIENT_SECRET")).ok();
            if let (Some(token_url), Some(client_id), Some(client_secret)) =
                (token_url, client_id, client_secret)
            {
                endpoints.insert(
                    id.to_string(),
                    TokenEndpoint {
                        token_url,
                        client_id,
                        client_secret,
                    },
                );
            }
        }
        Self {
            client: reqwest::Client::new(),
            endpoints,
        }
    }
}

#[async_trait]
impl OAuthBroker for EnvOAuthBroker {
    async fn refresh(
        &self,
        provider: &str,
        refresh_token: &str,
    ) -> Result<RefreshedToken, CoreError> {
        let endpoint = self.endpoints.get(provider).ok_or_else(|| {
            CoreError::Internal(format!("no OAuth endpoint configured for {provider}"))
        })?;

        let response = self
            .client
            .post(&endpoint.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &endpoint.client_id),
                ("client_secret", &endpoint.client_secret),
            ])
            .send()
            .await
            .map_err(|err| CoreError::Internal(format!("token endpoint unreachable: {err}")))?;

        if !response.status().is_success() {
            return Err(CoreError::Internal(format!(
                "token endpoint returned status {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| CoreError::Internal(format!("malformed token response: {err}")))?;

        Ok(RefreshedToken {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: token
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        })
    }
}
