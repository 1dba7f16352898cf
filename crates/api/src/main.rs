use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use drawbridge_api::background;
use drawbridge_api::channel::{DecisionChannel, LogChannel, WebhookChannel};
use drawbridge_api::config::ServerConfig;
use drawbridge_api::engine::upstream::UpstreamClient;
use drawbridge_api::oauth::EnvOAuthBroker;
use drawbridge_api::providers::ProviderRegistry;
use drawbridge_api::router::build_app_router;
use drawbridge_api::state::AppState;
use drawbridge_core::crypto::AesGcmCipher;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Logging ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drawbridge_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Configuration loaded");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL is required");

    let pool = drawbridge_db::create_pool(&database_url)
        .await
        .expect("Could not open the database pool");
    drawbridge_db::health_check(&pool)
        .await
        .expect("Database unreachable at startup");
    tracing::info!("Database pool ready");

    drawbridge_db::run_migrations(&pool)
        .await
        .expect("Migration run failed");
    tracing::info!("Migrations up to date");

    // --- Credential cipher ---
    let cipher = AesGcmCipher::from_hex_key(&config.credential_key)
        .expect("CREDENTIAL_KEY must be 64 hex chars");

    // --- Decision channel ---
    let channel: Arc<dyn DecisionChannel> =
        match (&config.channel_webhook_url, &config.channel_webhook_secret) {
            (Some(url), Some(secret)) => {
                tracing::info!("Decision channel: webhook");
                Arc::new(WebhookChannel::new(url.clone(), secret.clone()))
            }
            _ => {
                tracing::warn!(
                    "Decision channel: log only (set CHANNEL_WEBHOOK_URL and \
                     CHANNEL_WEBHOOK_SECRET to deliver prompts)"
                );
                Arc::new(LogChannel)
            }
        };

    // --- Providers and credential refresh ---
    let providers = ProviderRegistry::builtin();
    let oauth = EnvOAuthBroker::from_env(&providers.ids());
    tracing::info!(providers = ?providers.ids(), "Provider registry ready");

    // --- App state ---
    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config.clone()),
        providers: Arc::new(providers),
        channel,
        cipher: Arc::new(cipher),
        oauth: Arc::new(oauth),
        upstream: UpstreamClient::new(),
    };

    // --- Background sweeper ---
    let sweeper_cancel = tokio_util::sync::CancellationToken::new();
    let sweeper_handle = tokio::spawn(background::sweeper::run(
        pool.clone(),
        Arc::clone(&state.config),
        sweeper_cancel.clone(),
    ));

    // --- Serve ---
    let app = build_app_router(state, &config);

    if config.channel_token.is_none() {
        tracing::warn!("CHANNEL_TOKEN is unset; the /channel surface will answer 500");
    }

    let addr = SocketAddr::new(
        config.host.parse().expect("HOST is not a valid IP address"),
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Could not bind the listener");
    tracing::info!(%addr, "Accepting connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server exited with an error");

    // --- Drain ---
    tracing::info!("Listener closed, draining background tasks");

    sweeper_cancel.cancel();
    let _ = tokio::time::timeout(
        Duration::from_secs(config.shutdown_timeout_secs),
        sweeper_handle,
    )
    .await;
    tracing::info!("Expiry sweeper stopped");

    tracing::info!("Shutdown complete");
}

/// Resolve once a termination signal arrives.
///
/// Listens for SIGINT and, on Unix, SIGTERM; the latter is what
/// container runtimes and init systems send, so both paths drain the
/// server instead of dropping in-flight requests.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("SIGINT handler installation failed");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation failed")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("SIGINT received, shutting down");
        }
        () = terminate => {
            tracing::info!("SIGTERM received, shutting down");
        }
    }
}
