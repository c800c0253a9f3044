// Public AT Protocol client: unauthenticated XRPC reads over HTTP.
//
// Feed reads and profile lookups go through the public AppView and need no
// session. Writes live in `session`.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::pacing::{with_backoff, RequestPacer};

/// Default public API endpoint for AT Protocol read operations.
pub const DEFAULT_PUBLIC_API_URL: &str = "https://public.api.bsky.app";

pub const USER_AGENT: &str = concat!("rejoinder/", env!("CARGO_PKG_VERSION"));

/// A non-2xx XRPC response.
///
/// Kept as a typed error so callers can react to specific statuses (429
/// backoff) and error names (`ExpiredToken` refresh).
#[derive(Debug, Error)]
#[error("XRPC {nsid} returned {status}: {}", describe(.error, .message))]
pub struct XrpcError {
    pub nsid: String,
    pub status: u16,
    /// Machine-readable error name from the response body, e.g. "ExpiredToken".
    pub error: Option<String>,
    pub message: Option<String>,
}

fn describe(error: &Option<String>, message: &Option<String>) -> String {
    match (error, message) {
        (Some(e), Some(m)) => format!("{e} ({m})"),
        (Some(e), None) => e.clone(),
        (None, Some(m)) => m.clone(),
        (None, None) => "no details".to_string(),
    }
}

#[derive(Deserialize)]
struct XrpcErrorBody {
    error: Option<String>,
    message: Option<String>,
}

impl XrpcError {
    /// Build from a failed response, consuming its body.
    pub async fn from_response(nsid: &str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let parsed: Option<XrpcErrorBody> = serde_json::from_str(&body).ok();

        let (error, message) = match parsed {
            Some(b) => (b.error, b.message),
            None if body.trim().is_empty() => (None, None),
            None => (None, Some(crate::output::truncate_chars(body.trim(), 200))),
        };

        Self {
            nsid: nsid.to_string(),
            status,
            error,
            message,
        }
    }

    pub fn is_expired_token(&self) -> bool {
        self.error.as_deref() == Some("ExpiredToken")
    }
}

/// Unauthenticated HTTP client for public AT Protocol XRPC endpoints.
pub struct PublicAtpClient {
    client: reqwest::Client,
    base_url: String,
    pacer: Arc<RequestPacer>,
}

impl PublicAtpClient {
    /// Create a new public API client pointing at the given base URL.
    pub fn new(base_url: &str, pacer: Arc<RequestPacer>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            pacer,
        })
    }

    /// Make a GET request to an XRPC endpoint and deserialize the response.
    ///
    /// `nsid` is the XRPC method name (e.g. "app.bsky.feed.getAuthorFeed").
    /// Paced, and retried on 429.
    pub async fn xrpc_get<T: DeserializeOwned>(
        &self,
        nsid: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        with_backoff(&self.pacer, || self.get_once(nsid, params)).await
    }

    async fn get_once<T: DeserializeOwned>(&self, nsid: &str, params: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/xrpc/{}", self.base_url, nsid);

        debug!(nsid = nsid, "XRPC GET request");

        let response = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .with_context(|| format!("XRPC request failed: {nsid}"))?;

        if !response.status().is_success() {
            return Err(XrpcError::from_response(nsid, response).await.into());
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to deserialize {nsid} response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xrpc_error_display_includes_name_and_message() {
        let err = XrpcError {
            nsid: "com.atproto.repo.createRecord".to_string(),
            status: 400,
            error: Some("ExpiredToken".to_string()),
            message: Some("Token has expired".to_string()),
        };
        assert!(err.is_expired_token());
        assert_eq!(
            err.to_string(),
            "XRPC com.atproto.repo.createRecord returned 400: ExpiredToken (Token has expired)"
        );
    }

    #[test]
    fn xrpc_error_without_details() {
        let err = XrpcError {
            nsid: "app.bsky.feed.getAuthorFeed".to_string(),
            status: 502,
            error: None,
            message: None,
        };
        assert!(!err.is_expired_token());
        assert!(err.to_string().ends_with("502: no details"));
    }
}
