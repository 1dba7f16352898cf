//! Periodic expiry sweep for overdue approvals and idle Git sessions.
//!
//! Lifecycle reads already expire rows lazily on access; the sweeper
//! closes the gap for rows nobody polls again, so deadlines hold even
//! when the agent walks away. Runs on a fixed interval using
//! `tokio::time::interval`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use drawbridge_db::repositories::{GitSessionRepo, RequestRepo};

use crate::config::ServerConfig;
use crate::engine;

/// How often the sweep runs when `SWEEP_INTERVAL_SECS` is unset.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Run the expiry sweep loop until `cancel` is triggered.
pub async fn run(pool: PgPool, config: Arc<ServerConfig>, cancel: CancellationToken) {
    let interval_secs: u64 = std::env::var("SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

    tracing::info!(
        interval_secs,
        idle_timeout_secs = config.git_idle_timeout_secs,
        "Expiry sweeper started"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Expiry sweeper stopping");
                break;
            }
            _ = interval.tick() => {
                sweep(&pool, &config).await;
            }
        }
    }
}

/// One sweep pass: overdue requests, overdue sessions, idle sessions.
/// Each expired row gets its own audit event so the trail explains why
/// the lifecycle ended.
pub async fn sweep(pool: &PgPool, config: &ServerConfig) {
    match RequestRepo::expire_overdue(pool).await {
        Ok(rows) => {
            for row in &rows {
                engine::record(
                    pool,
                    "system",
                    Some("sweeper"),
                    "request.expired",
                    Some(row.id),
                    None,
                    json!({ "approval_deadline": row.approval_deadline }),
                )
                .await;
            }
            if !rows.is_empty() {
                tracing::info!(count = rows.len(), "Expired overdue requests");
            }
        }
        Err(e) => tracing::error!(error = %e, "Request expiry sweep failed"),
    }

    match GitSessionRepo::expire_overdue(pool).await {
        Ok(rows) => {
            for row in &rows {
                engine::record(
                    pool,
                    "system",
                    Some("sweeper"),
                    "session.expired",
                    None,
                    Some(row.id),
                    json!({ "approval_deadline": row.approval_deadline }),
                )
                .await;
            }
            if !rows.is_empty() {
                tracing::info!(count = rows.len(), "Expired overdue git sessions");
            }
        }
        Err(e) => tracing::error!(error = %e, "Session expiry sweep failed"),
    }

    let idle_cutoff = Utc::now() - chrono::Duration::seconds(config.git_idle_timeout_secs);
    match GitSessionRepo::expire_idle(pool, idle_cutoff).await {
        Ok(rows) => {
            for row in &rows {
                engine::record(
                    pool,
                    "system",
                    Some("sweeper"),
                    "session.expired",
                    None,
                    Some(row.id),
                    json!({ "idle_since": row.last_activity_at }),
                )
                .await;
            }
            if !rows.is_empty() {
                tracing::info!(count = rows.len(), "Expired idle git sessions");
            }
        }
        Err(e) => tracing::error!(error = %e, "Idle session sweep failed"),
    }
}
