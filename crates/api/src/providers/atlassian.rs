use drawbridge_core::error::CoreError;
use url::Url;

use super::Provider;

/// Atlassian cloud (Jira, Confluence): REST API at `api.atlassian.com`.
///
/// OAuth grants are scoped to specific cloud sites. The granted scope
/// stored with the credential carries the permitted cloud ids, and every
/// execution re-checks the target site against that list.
pub struct Atlassian;

impl Atlassian {
    /// Extract the cloud id from an `/ex/{product}/{cloud_id}/...` path.
    fn cloud_id(url: &Url) -> Option<String> {
        let mut segments = url.path_segments()?;
        if segments.next() != Some("ex") {
            return None;
        }
        let _product = segments.next()?;
        segments.next().map(|s| s.to_string()).filter(|s| !s.is_empty())
    }
}

impl Provider for Atlassian {
    fn id(&self) -> &'static str {
        "atlassian"
    }

    fn matches_rest_host(&self, host: &str) -> bool {
        host == "api.atlassian.com"
    }

    fn allowed_methods(&self) -> &'static [&'static str] {
        &["GET", "POST", "PUT", "DELETE"]
    }

    fn allows_url(&self, url: &Url) -> Result<(), CoreError> {
        if url.path().starts_with("/ex/") {
            Ok(())
        } else {
            Err(CoreError::Validation(
                "Atlassian requests must target the /ex/ site prefix".into(),
            ))
        }
    }

    fn check_scope(
        &self,
        url: &Url,
        granted_scope: Option<&serde_json::Value>,
    ) -> Result<(), CoreError> {
        let Some(cloud_id) = Self::cloud_id(url) else {
            return Err(CoreError::Validation(
                "Atlassian URL does not name a cloud site".into(),
            ));
        };
        let allowed = granted_scope
            .and_then(|scope| scope.get("cloud_ids"))
            .and_then(|ids| ids.as_array())
            .map(|ids| ids.iter().any(|id| id.as_str() == Some(cloud_id.as_str())))
            .unwrap_or(false);
        if allowed {
            Ok(())
        } else {
            Err(CoreError::Forbidden(format!(
                "credential grant does not cover cloud site {cloud_id}"
            )))
        }
    }

    fn auth_header(&self, access_secret: &str) -> String {
        format!("Bearer {access_secret}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scope_check_requires_the_target_cloud_id() {
        let provider = Atlassian;
        let url =
            Url::parse("https://api.atlassian.com/ex/jira/abc-123/rest/api/3/issue").unwrap();

        let granted = json!({ "cloud_ids": ["abc-123", "other"] });
        assert!(provider.check_scope(&url, Some(&granted)).is_ok());

        let wrong = json!({ "cloud_ids": ["different"] });
        assert!(provider.check_scope(&url, Some(&wrong)).is_err());
        assert!(provider.check_scope(&url, None).is_err());
    }

    #[test]
    fn cloud_id_parses_only_ex_paths() {
        let ex = Url::parse("https://api.atlassian.com/ex/jira/abc/rest").unwrap();
        assert_eq!(Atlassian::cloud_id(&ex).as_deref(), Some("abc"));
        let other = Url::parse("https://api.atlassian.com/oauth/token").unwrap();
        assert_eq!(Atlassian::cloud_id(&other), None);
    }
}
