use std::sync::Arc;

use drawbridge_core::crypto::SecretCipher;
use drawbridge_db::DbPool;

use crate::channel::DecisionChannel;
use crate::config::ServerConfig;
use crate::engine::upstream::UpstreamClient;
use crate::oauth::OAuthBroker;
use crate::providers::ProviderRegistry;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<ServerConfig>,
    pub providers: Arc<ProviderRegistry>,
    pub channel: Arc<dyn DecisionChannel>,
    pub cipher: Arc<dyn SecretCipher>,
    pub oauth: Arc<dyn OAuthBroker>,
    pub upstream: UpstreamClient,
}
