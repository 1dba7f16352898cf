//! Outbound HTTP plumbing shared by the REST executor and the Git proxy.
//!
//! The client never follows redirects on its own: every hop is
//! re-validated against the provider's hostnames so an upstream cannot
//! bounce an approved request onto a different host. Response bodies are
//! size-capped while streaming.

use std::time::Duration;

use axum::body::Bytes;
use axum::http::StatusCode;
use drawbridge_core::canonical::validate_upstream_url;
use futures::{Stream, StreamExt};
use url::Url;

/// A fully resolved request, ready to send. Built only from approved,
/// frozen captures plus the injected credential header.
#[derive(Debug)]
pub struct PreparedRequest {
    pub method: reqwest::Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// A buffered upstream response, relayed verbatim to the caller.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Why an upstream exchange failed before producing a response.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamFailure {
    #[error("upstream timed out")]
    Timeout,
    #[error("upstream unreachable: {0}")]
    Unreachable(String),
    #[error("upstream response exceeded the size cap")]
    TooLarge,
    #[error("redirect blocked: {0}")]
    RedirectBlocked(String),
}

impl UpstreamFailure {
    /// Stable machine code recorded with the failed request.
    pub fn code(&self) -> &'static str {
        match self {
            UpstreamFailure::Timeout => "UPSTREAM_TIMEOUT",
            UpstreamFailure::Unreachable(_) => "UPSTREAM_UNREACHABLE",
            UpstreamFailure::TooLarge => "RESPONSE_TOO_LARGE",
            UpstreamFailure::RedirectBlocked(_) => "REDIRECT_BLOCKED",
        }
    }
}

/// Limits applied to a single upstream exchange.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamLimits {
    pub timeout: Duration,
    pub byte_cap: u64,
    pub max_redirects: u32,
    pub allow_http: bool,
}

/// Shared outbound HTTP client.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
}

impl UpstreamClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("drawbridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("HTTP client construction cannot fail with static options");
        Self { client }
    }

    /// Execute a buffered exchange, following same-provider redirects.
    ///
    /// `allow_host` decides whether a redirect target may be followed;
    /// anything else fails as `RedirectBlocked` without being fetched.
    pub async fn execute(
        &self,
        request: &PreparedRequest,
        limits: &UpstreamLimits,
        allow_host: &(dyn Fn(&Url) -> bool + Send + Sync),
    ) -> Result<UpstreamResponse, UpstreamFailure> {
        let mut method = request.method.clone();
        let mut url = request.url.clone();
        let mut body = request.body.clone();

        for _hop in 0..=limits.max_redirects {
            let mut builder = self
                .client
                .request(method.clone(), url.clone())
                .timeout(limits.timeout);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(text) = &body {
                builder = builder.body(text.clone());
            }

            let response = builder.send().await.map_err(classify_send_error)?;
            let status = response.status();

            if status.is_redirection() {
                let location = response
                    .headers()
                    .get("location")
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        UpstreamFailure::RedirectBlocked("redirect without location".into())
                    })?;
                let target = url.join(location).map_err(|_| {
                    UpstreamFailure::RedirectBlocked(format!("unparseable location {location}"))
                })?;
                let target = validate_upstream_url(target.as_str(), limits.allow_http)
                    .map_err(|err| UpstreamFailure::RedirectBlocked(err.to_string()))?;
                if !allow_host(&target) {
                    return Err(UpstreamFailure::RedirectBlocked(format!(
                        "redirect to unapproved host {}",
                        target.host_str().unwrap_or("<none>")
                    )));
                }
                if status == StatusCode::SEE_OTHER {
                    method = reqwest::Method::GET;
                    body = None;
                }
                url = target;
                continue;
            }

            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .map(String::from);

            let body = collect_capped(response, limits.byte_cap).await?;
            return Ok(UpstreamResponse {
                status,
                content_type,
                body,
            });
        }

        Err(UpstreamFailure::RedirectBlocked(
            "redirect chain too long".into(),
        ))
    }

    /// Send a streaming exchange for the Git smart-HTTP proxy.
    ///
    /// Redirects are not followed at all here: the repository URL was
    /// approved verbatim and a moved repository needs a fresh session.
    /// The per-request timeout covers the whole streamed exchange.
    pub async fn relay(&self, request: WireRequest) -> Result<reqwest::Response, UpstreamFailure> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .timeout(request.timeout);
        if let Some((user, password)) = request.basic_auth {
            builder = builder.basic_auth(user, Some(password));
        }
        if let Some(value) = request.content_type {
            builder = builder.header("content-type", value);
        }
        if let Some(value) = request.accept {
            builder = builder.header("accept", value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(classify_send_error)?;
        if response.status().is_redirection() {
            return Err(UpstreamFailure::RedirectBlocked(
                "git upstream answered with a redirect".into(),
            ));
        }
        Ok(response)
    }
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

/// A streaming request for the Git wire proxy.
pub struct WireRequest {
    pub method: reqwest::Method,
    pub url: Url,
    pub basic_auth: Option<(String, String)>,
    pub content_type: Option<String>,
    pub accept: Option<String>,
    pub body: Option<reqwest::Body>,
    pub timeout: Duration,
}

fn classify_send_error(err: reqwest::Error) -> UpstreamFailure {
    if err.is_timeout() {
        UpstreamFailure::Timeout
    } else {
        // reqwest error strings name hosts, never header or body content.
        UpstreamFailure::Unreachable(err.to_string())
    }
}

/// Buffer a response body, failing once it exceeds `byte_cap`.
pub(crate) async fn collect_capped(
    response: reqwest::Response,
    byte_cap: u64,
) -> Result<Bytes, UpstreamFailure> {
    let mut collected: Vec<u8> = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| {
            if err.is_timeout() {
                UpstreamFailure::Timeout
            } else {
                UpstreamFailure::Unreachable(err.to_string())
            }
        })?;
        if collected.len() as u64 + chunk.len() as u64 > byte_cap {
            return Err(UpstreamFailure::TooLarge);
        }
        collected.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(collected))
}

/// Wrap a byte stream so it errors once the running total passes `byte_cap`.
///
/// Used on both directions of the Git proxy, where bodies are relayed
/// without buffering.
pub fn count_and_cap<S, E>(
    stream: S,
    byte_cap: u64,
) -> impl Stream<Item = Result<Bytes, UpstreamFailure>>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
{
    let mut total: u64 = 0;
    stream.map(move |item| match item {
        Ok(chunk) => {
            total += chunk.len() as u64;
            if total > byte_cap {
                Err(UpstreamFailure::TooLarge)
            } else {
                Ok(chunk)
            }
        }
        Err(err) => Err(UpstreamFailure::Unreachable(err.to_string())),
    })
}
