//! reqwest client for the direct channel.
//!
//! Keeps a cookie jar so the session cookie set by the login POST rides along
//! on every listing request. GETs are retried on 5xx answers and connection
//! errors, and back off on 429.

use anyhow::{Context, Result};
use std::time::Duration;

/// Response from an HTTP request.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Original requested URL.
    pub url: String,
    /// Final URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Content-Type header, if any.
    pub content_type: Option<String>,
    /// Response body as text.
    pub body: String,
}

/// Cookie-keeping HTTP client for the direct channel.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    max_retries: u32,
    backoff: Duration,
}

impl HttpClient {
    /// Create a client with a per-request timeout and its own cookie jar.
    pub fn new(timeout_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(5))
            .cookie_store(true)
            .user_agent(concat!("tablehaul/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            max_retries: 2,
            backoff: Duration::from_millis(500),
        })
    }

    /// Override the retry budget for 5xx answers and connection errors.
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    /// Backoff before retry number `attempt + 1`, capped at 256x the base.
    fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(1u32 << attempt.min(8))
    }

    /// GET with retry on 5xx and connection errors, backoff on 429.
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        let mut attempt = 0u32;
        loop {
            let outcome = self.client.get(url).send().await;
            let delay = match &outcome {
                Ok(r) if r.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => Some(retry_after(r)),
                Ok(r) if r.status().is_server_error() => Some(self.delay(attempt)),
                Ok(_) => None,
                Err(_) => Some(self.delay(attempt)),
            };
            let delay = match delay {
                Some(delay) if attempt < self.max_retries => delay,
                _ => {
                    let r = outcome.with_context(|| format!("GET {url}"))?;
                    return read_response(url, r).await;
                }
            };
            match &outcome {
                Ok(r) => tracing::debug!(url, status = r.status().as_u16(), "retrying in {delay:?}"),
                Err(e) => tracing::debug!(url, "request failed: {e}; retrying in {delay:?}"),
            }
            attempt += 1;
            tokio::time::sleep(delay).await;
        }
    }

    /// POST url-encoded form data. Not retried: a login POST is not
    /// idempotent from the site's point of view.
    pub async fn post_form(&self, url: &str, form_fields: &[(&str, &str)]) -> Result<HttpResponse> {
        let r = self
            .client
            .post(url)
            .form(form_fields)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        read_response(url, r).await
    }
}

/// Honour a numeric `Retry-After`, capped at ten seconds.
fn retry_after(r: &reqwest::Response) -> Duration {
    let secs = r
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(2);
    Duration::from_secs(secs.min(10))
}

async fn read_response(url: &str, r: reqwest::Response) -> Result<HttpResponse> {
    let status = r.status().as_u16();
    let final_url = r.url().to_string();
    let content_type = r
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = r
        .text()
        .await
        .with_context(|| format!("reading body of {url}"))?;

    Ok(HttpResponse {
        url: url.to_string(),
        final_url,
        status,
        content_type,
        body,
    })
}
