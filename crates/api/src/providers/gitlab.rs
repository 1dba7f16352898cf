use drawbridge_core::error::CoreError;
use url::Url;

use super::Provider;

/// GitLab: REST API and Git smart HTTP both live on `gitlab.com`.
///
/// REST calls must target the versioned API prefix so a brokered request
/// can never reach the web UI or raw-file endpoints on the same host.
pub struct GitLab;

impl Provider for GitLab {
    fn id(&self) -> &'static str {
        "gitlab"
    }

    fn matches_rest_host(&self, host: &str) -> bool {
        host == "gitlab.com"
    }

    fn matches_git_host(&self, host: &str) -> bool {
        host == "gitlab.com"
    }

    fn allowed_methods(&self) -> &'static [&'static str] {
        &["GET", "POST", "PUT", "DELETE"]
    }

    fn allows_url(&self, url: &Url) -> Result<(), CoreError> {
        if url.path().starts_with("/api/v4/") {
            Ok(())
        } else {
            Err(CoreError::Validation(
                "GitLab requests must target the /api/v4/ prefix".into(),
            ))
        }
    }

    fn auth_header(&self, access_secret: &str) -> String {
        format!("Bearer {access_secret}")
    }

    fn git_credentials(&self, access_secret: &str) -> Option<(String, String)> {
        Some(("oauth2".to_string(), access_secret.to_string()))
    }
}
