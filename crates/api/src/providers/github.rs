use drawbridge_core::error::CoreError;
use url::Url;

use super::Provider;

/// GitHub: REST API at `api.github.com`, Git smart HTTP at `github.com`.
pub struct GitHub;

impl Provider for GitHub {
    fn id(&self) -> &'static str {
        "github"
    }

    fn matches_rest_host(&self, host: &str) -> bool {
        host == "api.github.com"
    }

    fn matches_git_host(&self, host: &str) -> bool {
        host == "github.com"
    }

    fn allowed_methods(&self) -> &'static [&'static str] {
        &["GET", "POST", "PUT", "PATCH", "DELETE"]
    }

    fn extra_allowed_headers(&self) -> &'static [&'static str] {
        &["x-github-api-version"]
    }

    fn default_headers(&self) -> &'static [(&'static str, &'static str)] {
        &[
            ("accept", "application/vnd.github+json"),
            ("x-github-api-version", "2022-11-28"),
        ]
    }

    fn allows_url(&self, _url: &Url) -> Result<(), CoreError> {
        Ok(())
    }

    fn auth_header(&self, access_secret: &str) -> String {
        format!("Bearer {access_secret}")
    }

    fn git_credentials(&self, access_secret: &str) -> Option<(String, String)> {
        Some(("x-access-token".to_string(), access_secret.to_string()))
    }

    fn describe_rest(&self, method: &str, path: &str) -> Option<String> {
        let mut segments = path.trim_matches('/').split('/');
        match (method, segments.next()) {
            ("GET", Some("user")) => Some("Read your GitHub profile".to_string()),
            (_, Some("repos")) => {
                let owner = segments.next()?;
                let repo = segments.next()?;
                let what = match (method, segments.next()) {
                    ("GET", None) => "Read repository metadata".to_string(),
                    ("GET", Some("issues")) => "List issues".to_string(),
                    ("POST", Some("issues")) => "Open an issue".to_string(),
                    ("GET", Some("pulls")) => "List pull requests".to_string(),
                    ("POST", Some("pulls")) => "Open a pull request".to_string(),
                    _ => return None,
                };
                Some(format!("{what} on {owner}/{repo}"))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_common_calls() {
        let provider = GitHub;
        assert_eq!(
            provider.describe_rest("POST", "/repos/octo/demo/issues"),
            Some("Open an issue on octo/demo".to_string())
        );
        assert_eq!(
            provider.describe_rest("GET", "/user"),
            Some("Read your GitHub profile".to_string())
        );
        assert_eq!(provider.describe_rest("GET", "/gists"), None);
    }
}
