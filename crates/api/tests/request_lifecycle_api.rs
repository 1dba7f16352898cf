//! HTTP-level integration tests for the brokered request lifecycle:
//! capture, canonicalization, idempotent replay, polling, decisions,
//! and approval expiry.

mod common;

use axum::http::StatusCode;
use common::{
    assert_error_code, body_json, build_test_app, build_test_app_with_channel, get_auth,
    post_json, post_json_auth, CHANNEL_TOKEN,
};
use drawbridge_db::repositories::RequestRepo;
use serde_json::json;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// A capture-ready payload against the GitHub REST surface.
fn github_request() -> serde_json::Value {
    json!({
        "method": "GET",
        "url": "https://api.github.com/repos/octo/demo/issues?state=open&page=1",
        "headers": { "Accept": "application/vnd.github+json" },
        "consent_hint": "listing open issues for the weekly report"
    })
}

async fn decide(
    app: axum::Router,
    request_id: i64,
    identity: &str,
    decision: &str,
) -> axum::response::Response {
    post_json_auth(
        app,
        &format!("/channel/requests/{request_id}/decision"),
        json!({ "decider_identity": identity, "decision": decision }),
        CHANNEL_TOKEN,
    )
    .await
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_without_key_is_unauthorized(pool: PgPool) {
    let app = build_test_app(pool);
    let response = post_json(app, "/proxy/requests", github_request()).await;
    assert_error_code(response, StatusCode::UNAUTHORIZED, "UNAUTHORIZED").await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_with_unknown_key_is_unauthorized(pool: PgPool) {
    let app = build_test_app(pool);
    let response =
        post_json_auth(app, "/proxy/requests", github_request(), "not-a-real-key").await;
    assert_error_code(response, StatusCode::UNAUTHORIZED, "UNAUTHORIZED").await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn revoked_key_stops_authenticating(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (key, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    drawbridge_db::repositories::ApiKeyRepo::revoke(&pool, key.id)
        .await
        .expect("revoke should succeed");

    let app = build_test_app(pool);
    let response = post_json_auth(app, "/proxy/requests", github_request(), &plaintext).await;
    assert_error_code(response, StatusCode::UNAUTHORIZED, "UNAUTHORIZED").await;
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_captures_request_and_prompts_owner(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    let (app, channel) = build_test_app_with_channel(pool.clone());

    let response = post_json_auth(app, "/proxy/requests", github_request(), &plaintext).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = body_json(response).await;
    let data = &json["data"];
    assert_eq!(data["status"], "PENDING_APPROVAL");
    assert_eq!(data["provider"], "github");
    assert_eq!(data["method"], "GET");
    assert_eq!(data["upstream_host"], "api.github.com");
    let hash = data["integrity_hash"].as_str().expect("hash present");
    assert_eq!(hash.len(), 64, "integrity hash should be sha-256 hex");

    // Exactly one prompt went out, addressed to the owner.
    let prompts = channel.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].recipient, "slack:U100");
    assert!(
        prompts[0].title.contains("api.github.com"),
        "prompt title should name the host: {}",
        prompts[0].title
    );

    // The channel message reference was written back to the row.
    let id = data["id"].as_i64().expect("id present");
    let row = RequestRepo::find_by_id(&pool, id)
        .await
        .expect("lookup should succeed")
        .expect("row should exist");
    assert_eq!(row.prompt_message_ref.as_deref(), Some("msg-0"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn canonicalization_is_order_insensitive(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    let app = build_test_app(pool);

    let first = post_json_auth(
        app.clone(),
        "/proxy/requests",
        json!({
            "method": "get",
            "url": "https://api.github.com/repos/octo/demo/issues?state=open&page=1",
            "headers": { "Accept": "application/json" }
        }),
        &plaintext,
    )
    .await;
    let second = post_json_auth(
        app,
        "/proxy/requests",
        json!({
            "method": "GET",
            "url": "https://api.github.com/repos/octo/demo/issues?page=1&state=open",
            "headers": { "ACCEPT": "application/json" }
        }),
        &plaintext,
    )
    .await;

    let first = body_json(first).await;
    let second = body_json(second).await;

    // Distinct captures, identical canonical form.
    assert_ne!(first["data"]["id"], second["data"]["id"]);
    assert_eq!(first["data"]["integrity_hash"], second["data"]["integrity_hash"]);
    assert_eq!(first["data"]["url"], second["data"]["url"]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_rejects_caller_supplied_authorization(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    let app = build_test_app(pool);

    let response = post_json_auth(
        app,
        "/proxy/requests",
        json!({
            "method": "GET",
            "url": "https://api.github.com/user",
            "headers": { "Authorization": "Bearer stolen" }
        }),
        &plaintext,
    )
    .await;
    let message =
        assert_error_code(response, StatusCode::BAD_REQUEST, "VALIDATION_ERROR").await;
    assert!(
        message.contains("authorization"),
        "message should name the offending header: {message}"
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_rejects_unknown_host(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    let app = build_test_app(pool);

    let response = post_json_auth(
        app,
        "/proxy/requests",
        json!({ "method": "GET", "url": "https://api.example.com/things" }),
        &plaintext,
    )
    .await;
    assert_error_code(response, StatusCode::BAD_REQUEST, "VALIDATION_ERROR").await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_rejects_plain_http_when_not_allowed(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;

    let mut config = common::test_config();
    config.allow_http_upstream = false;
    let (app, _) = common::build_test_app_full(
        pool,
        config,
        std::sync::Arc::new(common::StaticOAuth::new("unused")),
    );

    let response = post_json_auth(
        app,
        "/proxy/requests",
        json!({ "method": "GET", "url": "http://api.github.com/user" }),
        &plaintext,
    )
    .await;
    assert_error_code(response, StatusCode::BAD_REQUEST, "VALIDATION_ERROR").await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_rejects_disallowed_method(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    let app = build_test_app(pool);

    // GitLab's adapter does not broker PATCH.
    let response = post_json_auth(
        app,
        "/proxy/requests",
        json!({ "method": "PATCH", "url": "https://gitlab.com/api/v4/projects/42" }),
        &plaintext,
    )
    .await;
    let message =
        assert_error_code(response, StatusCode::BAD_REQUEST, "VALIDATION_ERROR").await;
    assert!(message.contains("PATCH"), "message should name the method");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn create_rejects_oversized_idempotency_key(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    let app = build_test_app(pool);

    let mut payload = github_request();
    payload["idempotency_key"] = json!("k".repeat(256));
    let response = post_json_auth(app, "/proxy/requests", payload, &plaintext).await;
    assert_error_code(response, StatusCode::BAD_REQUEST, "VALIDATION_ERROR").await;
}

// ---------------------------------------------------------------------------
// Idempotent replay
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn idempotent_retry_replays_the_original_capture(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    let (app, channel) = build_test_app_with_channel(pool);

    let mut payload = github_request();
    payload["idempotency_key"] = json!("retry-batch-7");

    let first = post_json_auth(app.clone(), "/proxy/requests", payload.clone(), &plaintext).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = body_json(first).await;

    let second = post_json_auth(app, "/proxy/requests", payload, &plaintext).await;
    assert_eq!(second.status(), StatusCode::OK, "replay answers 200, not 201");
    let second = body_json(second).await;

    assert_eq!(first["data"]["id"], second["data"]["id"]);
    assert_eq!(channel.prompts().len(), 1, "the owner is prompted once");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn idempotency_keys_are_scoped_per_caller_key(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, key_a) = common::seed_key(&pool, owner.id, "laptop").await;
    let (_, key_b) = common::seed_key(&pool, owner.id, "ci").await;
    let app = build_test_app(pool);

    let mut payload = github_request();
    payload["idempotency_key"] = json!("retry-batch-7");

    let first = post_json_auth(app.clone(), "/proxy/requests", payload.clone(), &key_a).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let second = post_json_auth(app, "/proxy/requests", payload, &key_b).await;
    assert_eq!(
        second.status(),
        StatusCode::CREATED,
        "a different caller key gets its own capture"
    );
}

// ---------------------------------------------------------------------------
// Polling
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn poll_pending_returns_202_with_retry_hint(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    let app = build_test_app(pool);

    let created = post_json_auth(app.clone(), "/proxy/requests", github_request(), &plaintext).await;
    let id = body_json(created).await["data"]["id"].as_i64().unwrap();

    let response = get_auth(app, &format!("/proxy/requests/{id}"), &plaintext).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(
        response.headers().get("retry-after").map(|v| v.to_str().unwrap()),
        Some("5")
    );
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "PENDING_APPROVAL");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn poll_is_restricted_to_the_creating_key(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, key_a) = common::seed_key(&pool, owner.id, "laptop").await;
    let (_, key_b) = common::seed_key(&pool, owner.id, "ci").await;
    let app = build_test_app(pool);

    let created = post_json_auth(app.clone(), "/proxy/requests", github_request(), &key_a).await;
    let id = body_json(created).await["data"]["id"].as_i64().unwrap();

    let response = get_auth(app, &format!("/proxy/requests/{id}"), &key_b).await;
    assert_error_code(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn poll_unknown_request_returns_404(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    let app = build_test_app(pool);

    let response = get_auth(app, "/proxy/requests/999999", &plaintext).await;
    assert_error_code(response, StatusCode::NOT_FOUND, "NOT_FOUND").await;
}

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn approve_then_poll_reports_approved(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    let app = build_test_app(pool);

    let created = post_json_auth(app.clone(), "/proxy/requests", github_request(), &plaintext).await;
    let id = body_json(created).await["data"]["id"].as_i64().unwrap();

    let decided = decide(app.clone(), id, "slack:U100", "approve").await;
    assert_eq!(decided.status(), StatusCode::OK);
    assert_eq!(body_json(decided).await["data"]["status"], "APPROVED");

    let response = get_auth(app, &format!("/proxy/requests/{id}"), &plaintext).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(
        response.headers().get("retry-after").is_none(),
        "approved requests wait on the agent, not the owner"
    );
    assert_eq!(body_json(response).await["data"]["status"], "APPROVED");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn deny_then_poll_reports_denied(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    let app = build_test_app(pool);

    let created = post_json_auth(app.clone(), "/proxy/requests", github_request(), &plaintext).await;
    let id = body_json(created).await["data"]["id"].as_i64().unwrap();

    let decided = decide(app.clone(), id, "slack:U100", "deny").await;
    assert_eq!(decided.status(), StatusCode::OK);

    let response = get_auth(app, &format!("/proxy/requests/{id}"), &plaintext).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["data"]["status"], "DENIED");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn only_the_owner_identity_may_decide(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    let app = build_test_app(pool);

    let created = post_json_auth(app.clone(), "/proxy/requests", github_request(), &plaintext).await;
    let id = body_json(created).await["data"]["id"].as_i64().unwrap();

    let response = decide(app, id, "slack:UIMPOSTOR", "approve").await;
    assert_error_code(response, StatusCode::FORBIDDEN, "FORBIDDEN").await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn a_second_decision_conflicts(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    let app = build_test_app(pool);

    let created = post_json_auth(app.clone(), "/proxy/requests", github_request(), &plaintext).await;
    let id = body_json(created).await["data"]["id"].as_i64().unwrap();

    let first = decide(app.clone(), id, "slack:U100", "deny").await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = decide(app, id, "slack:U100", "approve").await;
    assert_error_code(second, StatusCode::CONFLICT, "NOT_PENDING").await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn decision_verb_must_be_approve_or_deny(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    let app = build_test_app(pool);

    let created = post_json_auth(app.clone(), "/proxy/requests", github_request(), &plaintext).await;
    let id = body_json(created).await["data"]["id"].as_i64().unwrap();

    let response = decide(app, id, "slack:U100", "maybe").await;
    assert_error_code(response, StatusCode::BAD_REQUEST, "BAD_REQUEST").await;
}

// ---------------------------------------------------------------------------
// Approval expiry
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn overdue_request_expires_on_poll(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    let app = build_test_app(pool.clone());

    let created = post_json_auth(app.clone(), "/proxy/requests", github_request(), &plaintext).await;
    let id = body_json(created).await["data"]["id"].as_i64().unwrap();
    common::backdate_request_deadline(&pool, id).await;

    let response = get_auth(app, &format!("/proxy/requests/{id}"), &plaintext).await;
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body_json(response).await["data"]["status"], "EXPIRED");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn overdue_request_cannot_be_decided(pool: PgPool) {
    let owner = common::seed_owner(&pool, "slack:U100").await;
    let (_, plaintext) = common::seed_key(&pool, owner.id, "laptop").await;
    let app = build_test_app(pool.clone());

    let created = post_json_auth(app.clone(), "/proxy/requests", github_request(), &plaintext).await;
    let id = body_json(created).await["data"]["id"].as_i64().unwrap();
    common::backdate_request_deadline(&pool, id).await;

    let response = decide(app, id, "slack:U100", "approve").await;
    assert_error_code(response, StatusCode::REQUEST_TIMEOUT, "APPROVAL_EXPIRED").await;
}
