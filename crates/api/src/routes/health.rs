use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` when every probe passes, `degraded` otherwise.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the database answered a liveness query.
    pub db_healthy: bool,
    /// Where approval prompts go: `webhook` when one is configured,
    /// otherwise `log`.
    pub prompt_delivery: &'static str,
    /// Provider adapters the broker can route requests to.
    pub providers: Vec<&'static str>,
}

/// GET /health -- service, database, and broker wiring at a glance.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = drawbridge_db::health_check(&state.pool).await.is_ok();

    let prompt_delivery = if state.config.channel_webhook_url.is_some()
        && state.config.channel_webhook_secret.is_some()
    {
        "webhook"
    } else {
        "log"
    };

    Json(HealthResponse {
        status: if db_healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        prompt_delivery,
        providers: state.providers.ids(),
    })
}

/// Mount health check routes (root-level, outside the brokered surfaces).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
