//! Upstream provider adapters.
//!
//! A provider adapter binds a third-party service to the broker: which
//! hostnames it owns, which methods and extra headers it accepts, how a
//! stored credential becomes an `Authorization` header, and (for Git
//! hosts) how the credential maps onto HTTP basic auth. The adapter is
//! selected from the upstream hostname at request creation; callers
//! never name a provider directly.

mod atlassian;
mod github;
mod gitlab;

pub use atlassian::Atlassian;
pub use github::GitHub;
pub use gitlab::GitLab;

use drawbridge_core::error::CoreError;
use url::Url;

/// Header names every provider accepts on a brokered REST request.
pub const BASE_ALLOWED_HEADERS: &[&str] = &["accept", "content-type"];

/// A third-party service the broker can execute requests against.
pub trait Provider: Send + Sync {
    /// Stable identifier, also the `provider` value on linked credentials.
    fn id(&self) -> &'static str;

    /// Whether this adapter owns the given REST API hostname.
    fn matches_rest_host(&self, host: &str) -> bool;

    /// Whether this adapter owns the given Git smart-HTTP hostname.
    fn matches_git_host(&self, _host: &str) -> bool {
        false
    }

    /// HTTP methods accepted for brokered requests.
    fn allowed_methods(&self) -> &'static [&'static str];

    /// Caller-suppliable header names beyond [`BASE_ALLOWED_HEADERS`].
    fn extra_allowed_headers(&self) -> &'static [&'static str] {
        &[]
    }

    /// Headers injected at execution when the caller did not set them.
    fn default_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[]
    }

    /// Provider-specific URL shape check (path prefix rules and the like).
    fn allows_url(&self, _url: &Url) -> Result<(), CoreError> {
        Ok(())
    }

    /// Verify the stored credential grant covers the target URL.
    fn check_scope(
        &self,
        _url: &Url,
        _granted_scope: Option<&serde_json::Value>,
    ) -> Result<(), CoreError> {
        Ok(())
    }

    /// Build the `Authorization` header value from a decrypted access secret.
    fn auth_header(&self, access_secret: &str) -> String;

    /// Basic-auth username/password pair for Git smart HTTP, when supported.
    fn git_credentials(&self, _access_secret: &str) -> Option<(String, String)> {
        None
    }

    /// Optional one-line summary of what a REST call does, for prompts.
    fn describe_rest(&self, _method: &str, _path: &str) -> Option<String> {
        None
    }
}

/// The set of configured provider adapters.
pub struct ProviderRegistry {
    providers: Vec<Box<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Box<dyn Provider>>) -> Self {
        Self { providers }
    }

    /// Registry with all built-in adapters.
    pub fn builtin() -> Self {
        Self::new(vec![
            Box::new(GitHub),
            Box::new(GitLab),
            Box::new(Atlassian),
        ])
    }

    /// Resolve the adapter owning a REST API hostname.
    pub fn for_rest_host(&self, host: &str) -> Option<&dyn Provider> {
        self.providers
            .iter()
            .find(|p| p.matches_rest_host(host))
            .map(|p| p.as_ref())
    }

    /// Resolve the adapter owning a Git smart-HTTP hostname.
    pub fn for_git_host(&self, host: &str) -> Option<&dyn Provider> {
        self.providers
            .iter()
            .find(|p| p.matches_git_host(host))
            .map(|p| p.as_ref())
    }

    /// Look an adapter up by its stable identifier.
    pub fn by_id(&self, id: &str) -> Option<&dyn Provider> {
        self.providers
            .iter()
            .find(|p| p.id() == id)
            .map(|p| p.as_ref())
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.id()).collect()
    }
}

/// Check a caller-supplied header name against the provider allowlist.
///
/// `authorization` is rejected outright: the broker injects credentials
/// itself and never forwards caller-supplied ones.
pub fn check_header_allowed(provider: &dyn Provider, name: &str) -> Result<(), CoreError> {
    if name == "authorization" {
        return Err(CoreError::Validation(
            "the authorization header is managed by the broker and cannot be supplied".into(),
        ));
    }
    if BASE_ALLOWED_HEADERS.contains(&name)
        || provider.extra_allowed_headers().contains(&name)
    {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "header {name} is not allowed for {}",
            provider.id()
        )))
    }
}
