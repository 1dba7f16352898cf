//! Shared helpers for API integration tests.
//!
//! Builds the production router (same middleware stack as `main.rs`)
//! with test collaborators swapped in at the trait seams: a recording
//! decision channel, a provider bound to loopback stub servers, a
//! static OAuth broker, and the real AES-GCM cipher under a fixed key.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use drawbridge_api::channel::{ApprovalPrompt, DecisionChannel};
use drawbridge_api::config::ServerConfig;
use drawbridge_api::engine::upstream::UpstreamClient;
use drawbridge_api::oauth::{OAuthBroker, RefreshedToken};
use drawbridge_api::providers::{Atlassian, GitHub, GitLab, Provider, ProviderRegistry};
use drawbridge_api::router::build_app_router;
use drawbridge_api::state::AppState;
use drawbridge_core::crypto::{AesGcmCipher, SecretCipher};
use drawbridge_core::error::CoreError;
use drawbridge_core::secrets::mint_api_key;
use drawbridge_core::types::DbId;
use drawbridge_db::models::api_key::ApiKey;
use drawbridge_db::models::user::User;
use drawbridge_db::repositories::{ApiKeyRepo, CredentialRepo, UserRepo};

/// Bearer token guarding the `/channel` surface in tests.
pub const CHANNEL_TOKEN: &str = "test-channel-token";

/// Fixed 32-byte AES key, hex encoded.
pub const CREDENTIAL_KEY: &str =
    "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

/// Build a test `ServerConfig` with safe defaults.
///
/// `allow_http_upstream` is on so exchanges can target loopback stub
/// servers, and the channel token is set so the `/channel` surface is
/// exercisable.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        public_base_url: "http://localhost:3000".to_string(),
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        approval_ttl_secs: 900,
        git_session_ttl_secs: 900,
        git_idle_timeout_secs: 3600,
        upstream_timeout_secs: 10,
        git_upstream_timeout_secs: 10,
        upstream_byte_cap: 1024 * 1024,
        git_byte_cap: 1024 * 1024,
        push_prefix_cap: 4096,
        max_redirects: 5,
        allow_http_upstream: true,
        credential_key: CREDENTIAL_KEY.to_string(),
        channel_token: Some(CHANNEL_TOKEN.to_string()),
        channel_webhook_url: None,
        channel_webhook_secret: None,
    }
}

// ---------------------------------------------------------------------------
// Test collaborators
// ---------------------------------------------------------------------------

/// Decision channel that records prompts and notices in memory and
/// hands back deterministic message references.
#[derive(Default)]
pub struct RecordingChannel {
    prompts: Mutex<Vec<ApprovalPrompt>>,
    notices: Mutex<Vec<(String, String)>>,
    counter: AtomicUsize,
}

impl RecordingChannel {
    pub fn prompts(&self) -> Vec<ApprovalPrompt> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<(String, String)> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl DecisionChannel for RecordingChannel {
    async fn prompt_request(
        &self,
        prompt: &ApprovalPrompt,
    ) -> Result<Option<String>, CoreError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(Some(format!("msg-{n}")))
    }

    async fn prompt_session(
        &self,
        prompt: &ApprovalPrompt,
    ) -> Result<Option<String>, CoreError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(Some(format!("msg-{n}")))
    }

    async fn notify(&self, recipient: &str, text: &str) -> Result<(), CoreError> {
        self.notices
            .lock()
            .unwrap()
            .push((recipient.to_string(), text.to_string()));
        Ok(())
    }
}

/// OAuth broker that always answers with the same fresh token.
pub struct StaticOAuth {
    token: &'static str,
    calls: AtomicUsize,
}

impl StaticOAuth {
    pub fn new(token: &'static str) -> Self {
        Self {
            token,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OAuthBroker for StaticOAuth {
    async fn refresh(
        &self,
        _provider: &str,
        _refresh_token: &str,
    ) -> Result<RefreshedToken, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RefreshedToken {
            access_token: self.token.to_string(),
            refresh_token: None,
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        })
    }
}

/// OAuth broker that declines every exchange.
pub struct FailingOAuth;

#[async_trait]
impl OAuthBroker for FailingOAuth {
    async fn refresh(
        &self,
        _provider: &str,
        _refresh_token: &str,
    ) -> Result<RefreshedToken, CoreError> {
        Err(CoreError::Internal("token endpoint declined".into()))
    }
}

/// Provider bound to 127.0.0.1 so stub servers can stand in for the
/// upstream on both the REST and Git surfaces.
pub struct LoopbackProvider;

impl Provider for LoopbackProvider {
    fn id(&self) -> &'static str {
        "loopback"
    }

    fn matches_rest_host(&self, host: &str) -> bool {
        host == "127.0.0.1"
    }

    fn matches_git_host(&self, host: &str) -> bool {
        host == "127.0.0.1"
    }

    fn allowed_methods(&self) -> &'static [&'static str] {
        &["GET", "POST", "PUT", "PATCH", "DELETE"]
    }

    fn extra_allowed_headers(&self) -> &'static [&'static str] {
        &["x-echo"]
    }

    fn default_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[("x-injected-default", "on")]
    }

    fn auth_header(&self, access_secret: &str) -> String {
        format!("Bearer {access_secret}")
    }

    fn git_credentials(&self, access_secret: &str) -> Option<(String, String)> {
        Some(("x-access-token".to_string(), access_secret.to_string()))
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Build the application router plus handles on the injected
/// collaborators, mirroring the wiring in `main.rs`.
pub fn build_test_app_full(
    pool: PgPool,
    config: ServerConfig,
    oauth: Arc<dyn OAuthBroker>,
) -> (Router, Arc<RecordingChannel>) {
    let channel = Arc::new(RecordingChannel::default());
    let cipher =
        AesGcmCipher::from_hex_key(&config.credential_key).expect("test credential key is valid");
    let providers = ProviderRegistry::new(vec![
        Box::new(GitHub),
        Box::new(GitLab),
        Box::new(Atlassian),
        Box::new(LoopbackProvider),
    ]);

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        providers: Arc::new(providers),
        channel: channel.clone(),
        cipher: Arc::new(cipher),
        oauth,
        upstream: UpstreamClient::new(),
    };

    (build_app_router(state, &config), channel)
}

/// Build the application router with default test config.
pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_full(pool, test_config(), Arc::new(StaticOAuth::new("refreshed-token"))).0
}

/// Build the application router and keep the recording channel handle.
pub fn build_test_app_with_channel(pool: PgPool) -> (Router, Arc<RecordingChannel>) {
    build_test_app_full(pool, test_config(), Arc::new(StaticOAuth::new("refreshed-token")))
}

/// The cipher used by seeded fixtures, keyed identically to the app.
pub fn test_cipher() -> AesGcmCipher {
    AesGcmCipher::from_hex_key(CREDENTIAL_KEY).expect("test credential key is valid")
}

// ---------------------------------------------------------------------------
// Database fixtures
// ---------------------------------------------------------------------------

/// Create an account owner directly in the database.
pub async fn seed_owner(pool: &PgPool, channel_identity: &str) -> User {
    UserRepo::upsert(pool, channel_identity, Some("Test Owner"))
        .await
        .expect("owner creation should succeed")
}

/// Mint an agent API key for an owner; returns the row and the plaintext.
pub async fn seed_key(pool: &PgPool, user_id: DbId, label: &str) -> (ApiKey, String) {
    let minted = mint_api_key();
    let key = ApiKeyRepo::create(pool, user_id, label, &minted.prefix, &minted.hash)
        .await
        .expect("key creation should succeed");
    (key, minted.plaintext)
}

/// Link a live provider credential, encrypting the secret like the
/// channel surface does.
pub async fn seed_credential(pool: &PgPool, user_id: DbId, provider: &str, secret: &str) {
    let cipher = test_cipher();
    let ciphertext = cipher.encrypt(secret).expect("encryption should succeed");
    CredentialRepo::upsert(pool, user_id, provider, &ciphertext, None, None, None)
        .await
        .expect("credential link should succeed");
}

/// Link a credential whose access secret already expired, carrying a
/// refresh token so execution must go through the OAuth broker.
pub async fn seed_expired_credential(
    pool: &PgPool,
    user_id: DbId,
    provider: &str,
    secret: &str,
    refresh_secret: &str,
) {
    let cipher = test_cipher();
    let ciphertext = cipher.encrypt(secret).expect("encryption should succeed");
    let refresh_ciphertext = cipher
        .encrypt(refresh_secret)
        .expect("encryption should succeed");
    let expired_at = Utc::now() - chrono::Duration::minutes(5);
    CredentialRepo::upsert(
        pool,
        user_id,
        provider,
        &ciphertext,
        Some(&refresh_ciphertext),
        None,
        Some(expired_at),
    )
    .await
    .expect("credential link should succeed");
}

/// Push a request or session approval deadline into the past, bypassing
/// the engine so lazy expiry and the sweeper can be observed.
pub async fn backdate_request_deadline(pool: &PgPool, id: DbId) {
    sqlx::query(
        "UPDATE proxy_requests SET approval_deadline = NOW() - INTERVAL '1 minute' WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await
    .expect("deadline update should succeed");
}

pub async fn backdate_session_deadline(pool: &PgPool, id: DbId) {
    sqlx::query(
        "UPDATE git_sessions SET approval_deadline = NOW() - INTERVAL '1 minute' WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await
    .expect("deadline update should succeed");
}

// ---------------------------------------------------------------------------
// Stub upstream servers
// ---------------------------------------------------------------------------

/// Serve a stub upstream on an ephemeral loopback port.
pub async fn spawn_upstream(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("loopback bind should succeed");
    let addr = listener.local_addr().expect("local addr should resolve");
    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("stub server should run");
    });
    addr
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, path: &str) -> Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get_auth(app: Router, path: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .method("GET")
        .uri(path)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, path: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json_auth(
    app: Router,
    path: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn put_json_auth(
    app: Router,
    path: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    let request = Request::builder()
        .method("PUT")
        .uri(path)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn delete_auth(app: Router, path: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .method("DELETE")
        .uri(path)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST a raw wire body (Git smart HTTP), no bearer header.
pub async fn post_wire(
    app: Router,
    path: &str,
    content_type: &str,
    body: Vec<u8>,
) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", content_type)
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST a wire body delivered as separate chunks, so the push gate sees
/// the command section arrive incrementally instead of in one read.
pub async fn post_wire_chunked(
    app: Router,
    path: &str,
    content_type: &str,
    chunks: Vec<Vec<u8>>,
) -> Response<Body> {
    let stream = futures::stream::iter(
        chunks
            .into_iter()
            .map(|chunk| Ok::<_, std::io::Error>(Bytes::from(chunk))),
    );
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", content_type)
        .body(Body::from_stream(stream))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes()
}

/// Assert an error envelope and return its message.
pub async fn assert_error_code(response: Response<Body>, status: StatusCode, code: &str) -> String {
    assert_eq!(response.status(), status, "unexpected HTTP status");
    let json = body_json(response).await;
    assert_eq!(json["code"], code, "unexpected error code: {json}");
    json["error"].as_str().unwrap_or_default().to_string()
}
