/// Server configuration loaded from environment variables.
///
/// All fields except `CREDENTIAL_KEY` have defaults suitable for local
/// development. In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Externally reachable base URL, embedded in one-time Git remotes.
    pub public_base_url: String,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds for the JSON surface.
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds.
    pub shutdown_timeout_secs: u64,
    /// Seconds a request may await its human decision before expiring.
    pub approval_ttl_secs: i64,
    /// Seconds a Git session may await its human decision before expiring.
    pub git_session_ttl_secs: i64,
    /// Seconds of proxy inactivity after which an active session expires.
    pub git_idle_timeout_secs: i64,
    /// Wall-clock bound on a brokered REST exchange.
    pub upstream_timeout_secs: u64,
    /// Wall-clock bound on a proxied Git exchange (clones and pushes
    /// move real data, so this is generous).
    pub git_upstream_timeout_secs: u64,
    /// Byte cap on brokered REST response bodies.
    pub upstream_byte_cap: u64,
    /// Byte cap on proxied Git transfer bodies, each direction.
    pub git_byte_cap: u64,
    /// Byte cap on the buffered command section of a push request.
    pub push_prefix_cap: usize,
    /// Redirect hops followed per brokered exchange.
    pub max_redirects: u32,
    /// Permit `http://` upstreams. Only for local stubs; never production.
    pub allow_http_upstream: bool,
    /// 64-char hex AES-256 key encrypting stored credentials. Required.
    pub credential_key: String,
    /// Bearer token guarding the `/channel` callback surface.
    pub channel_token: Option<String>,
    /// Where outbound approval prompts are POSTed, when configured.
    pub channel_webhook_url: Option<String>,
    /// HMAC key signing outbound prompt payloads.
    pub channel_webhook_secret: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                  |
    /// |-----------------------------|--------------------------|
    /// | `HOST`                      | `0.0.0.0`                |
    /// | `PORT`                      | `3000`                   |
    /// | `PUBLIC_BASE_URL`           | `http://localhost:3000`  |
    /// | `CORS_ORIGINS`              | `http://localhost:5173`  |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                     |
    /// | `SHUTDOWN_TIMEOUT_SECS`     | `30`                     |
    /// | `APPROVAL_TTL_SECS`         | `900`                    |
    /// | `GIT_SESSION_TTL_SECS`      | `900`                    |
    /// | `GIT_IDLE_TIMEOUT_SECS`     | `3600`                   |
    /// | `UPSTREAM_TIMEOUT_SECS`     | `60`                     |
    /// | `GIT_UPSTREAM_TIMEOUT_SECS` | `600`                    |
    /// | `UPSTREAM_BYTE_CAP`         | `10485760` (10 MiB)      |
    /// | `GIT_BYTE_CAP`              | `536870912` (512 MiB)    |
    /// | `PUSH_PREFIX_CAP`           | `65536` (64 KiB)         |
    /// | `MAX_REDIRECTS`             | `5`                      |
    /// | `ALLOW_HTTP_UPSTREAM`       | `false`                  |
    /// | `CREDENTIAL_KEY`            | (required)               |
    /// | `CHANNEL_TOKEN`             | (unset)                  |
    /// | `CHANNEL_WEBHOOK_URL`       | (unset)                  |
    /// | `CHANNEL_WEBHOOK_SECRET`    | (unset)                  |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".into())
            .trim_end_matches('/')
            .to_string();

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let allow_http_upstream = std::env::var("ALLOW_HTTP_UPSTREAM")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let credential_key = std::env::var("CREDENTIAL_KEY")
            .expect("CREDENTIAL_KEY must be set (64 hex chars)");

        Self {
            host,
            port: parse_var("PORT", "3000"),
            public_base_url,
            cors_origins,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", "30"),
            shutdown_timeout_secs: parse_var("SHUTDOWN_TIMEOUT_SECS", "30"),
            approval_ttl_secs: parse_var("APPROVAL_TTL_SECS", "900"),
            git_session_ttl_secs: parse_var("GIT_SESSION_TTL_SECS", "900"),
            git_idle_timeout_secs: parse_var("GIT_IDLE_TIMEOUT_SECS", "3600"),
            upstream_timeout_secs: parse_var("UPSTREAM_TIMEOUT_SECS", "60"),
            git_upstream_timeout_secs: parse_var("GIT_UPSTREAM_TIMEOUT_SECS", "600"),
            upstream_byte_cap: parse_var("UPSTREAM_BYTE_CAP", "10485760"),
            git_byte_cap: parse_var("GIT_BYTE_CAP", "536870912"),
            push_prefix_cap: parse_var("PUSH_PREFIX_CAP", "65536"),
            max_redirects: parse_var("MAX_REDIRECTS", "5"),
            allow_http_upstream,
            credential_key,
            channel_token: std::env::var("CHANNEL_TOKEN").ok(),
            channel_webhook_url: std::env::var("CHANNEL_WEBHOOK_URL").ok(),
            channel_webhook_secret: std::env::var("CHANNEL_WEBHOOK_SECRET").ok(),
        }
    }
}

/// Parse a numeric env var, panicking with the var name on bad input so
/// misconfiguration fails at startup.
fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> T {
    std::env::var(name)
        .unwrap_or_else(|_| default.into())
        .parse()
        .unwrap_or_else(|_| panic!("{name} must be a valid {}", std::any::type_name::<T>()))
}
