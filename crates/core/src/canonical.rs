//! Upstream request canonicalization and integrity hashing.
//!
//! The broker never executes what the caller sent; it executes what it
//! stored. Canonicalization makes that stored form deterministic so two
//! semantically identical requests (same query pairs in a different
//! order, different header-name casing) hash identically, and so the
//! hash shown to the approving owner provably matches the request that
//! later executes.
//!
//! Canonical serialization:
//!
//! ```text
//! METHOD \n canonical-url \n name:value \n ... \n \n body
//! ```
//!
//! with the URL scheme/host lowercased, the default port and fragment
//! dropped, query pairs re-ordered by key then value (stable,
//! duplicate-preserving), header names lowercased, header values
//! trimmed, and header lines sorted.

use url::Url;

use crate::error::CoreError;
use crate::hashing::sha256_hex;

/// Number of integrity-hash characters surfaced in approval prompts.
pub const HASH_PREFIX_LENGTH: usize = 12;

/// A fully canonicalized upstream request, ready to hash and persist.
#[derive(Debug, Clone)]
pub struct CanonicalRequest {
    /// Upper-cased HTTP method.
    pub method: String,
    /// Normalized URL with re-ordered query and no fragment.
    pub url: Url,
    /// Lower-cased host (convenience copy of `url.host_str()`).
    pub host: String,
    /// URL path without the query string (always-allow rules key on this).
    pub path: String,
    /// Lower-cased, value-trimmed headers sorted by name then value.
    pub headers: Vec<(String, String)>,
    /// Request body, when present (UTF-8 text).
    pub body: Option<String>,
}

impl CanonicalRequest {
    /// The deterministic serialization that gets hashed.
    pub fn canonical_string(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.method);
        out.push('\n');
        out.push_str(self.url.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            out.push_str(name);
            out.push(':');
            out.push_str(value);
            out.push('\n');
        }
        out.push('\n');
        if let Some(body) = &self.body {
            out.push_str(body);
        }
        out
    }

    /// SHA-256 hex digest of the canonical serialization.
    pub fn integrity_hash(&self) -> String {
        sha256_hex(self.canonical_string().as_bytes())
    }

    /// Headers as a JSON object (keys are already unique and sorted).
    pub fn headers_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::Value::Object(map)
    }

    /// The query string truncated for prompt display, if any.
    pub fn truncated_query(&self, max_chars: usize) -> Option<String> {
        let query = self.url.query()?;
        if query.chars().count() <= max_chars {
            Some(query.to_string())
        } else {
            let cut: String = query.chars().take(max_chars).collect();
            Some(format!("{cut}…"))
        }
    }
}

/// Shorten an integrity hash for prompt display.
pub fn hash_prefix(hash: &str) -> &str {
    &hash[..HASH_PREFIX_LENGTH.min(hash.len())]
}

/// Canonicalize a caller-described upstream request.
///
/// Validates the URL shape (absolute, `https` unless `allow_http`, no
/// embedded credentials, has a host) and the method token. Policy checks
/// against the matched provider (allowed methods/headers/hosts) happen
/// in the engine, after adapter selection.
pub fn canonicalize(
    method: &str,
    raw_url: &str,
    headers: &[(String, String)],
    body: Option<String>,
    allow_http: bool,
) -> Result<CanonicalRequest, CoreError> {
    let method = validate_method(method)?;
    let url = validate_upstream_url(raw_url, allow_http)?;

    let host = url
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .ok_or_else(|| CoreError::Validation("upstream URL has no host".into()))?;
    let path = url.path().to_string();

    let mut headers: Vec<(String, String)> = headers
        .iter()
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    headers.sort();

    Ok(CanonicalRequest {
        method,
        url,
        host,
        path,
        headers,
        body,
    })
}

/// Validate and normalize an upstream URL without the full canonical pass.
///
/// Also used for Git repository coordinates and redirect targets.
pub fn validate_upstream_url(raw_url: &str, allow_http: bool) -> Result<Url, CoreError> {
    let mut url = Url::parse(raw_url)
        .map_err(|e| CoreError::Validation(format!("invalid upstream URL: {e}")))?;

    match url.scheme() {
        "https" => {}
        "http" if allow_http => {}
        other => {
            return Err(CoreError::Validation(format!(
                "upstream URL must use https, got {other}"
            )))
        }
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(CoreError::Validation(
            "upstream URL must not embed credentials".into(),
        ));
    }
    if url.host_str().is_none() {
        return Err(CoreError::Validation("upstream URL has no host".into()));
    }

    url.set_fragment(None);
    reorder_query(&mut url);
    Ok(url)
}

fn validate_method(method: &str) -> Result<String, CoreError> {
    let method = method.trim().to_ascii_uppercase();
    if method.is_empty() || !method.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CoreError::Validation(format!(
            "invalid HTTP method: {method:?}"
        )));
    }
    Ok(method)
}

/// Re-order query pairs by key then value.
///
/// The sort is stable so duplicate pairs keep their relative order, and
/// pairs are preserved verbatim (no de-duplication). A present-but-empty
/// query (`?`) is dropped entirely.
fn reorder_query(url: &mut Url) {
    let Some(query) = url.query().map(str::to_owned) else {
        return;
    };
    if query.is_empty() {
        url.set_query(None);
        return;
    }

    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    let sorted: String = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    url.set_query(Some(&sorted));
}
