// Authenticated PDS session: login, token refresh, and record writes.
//
// Only publishing needs a session. Access tokens expire after a couple of
// hours, so a long-running bot refreshes in place the first time a write
// comes back with `ExpiredToken`. Refresh tokens expire too; when the refresh
// is rejected we log in again with the stored app password.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::client::{XrpcError, USER_AGENT};
use super::pacing::{with_backoff, RequestPacer};
use crate::error::BotError;
use crate::reply::PostRef;

/// Default PDS (entryway) for login and writes.
pub const DEFAULT_PDS_URL: &str = "https://bsky.social";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    access_jwt: String,
    refresh_jwt: String,
    did: String,
    handle: String,
}

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct CreateRecordRequest<'a, R: Serialize> {
    repo: &'a str,
    collection: &'a str,
    record: &'a R,
}

struct Tokens {
    access_jwt: String,
    refresh_jwt: String,
}

struct Credentials {
    identifier: String,
    password: String,
}

/// A logged-in bot account.
pub struct BotSession {
    client: reqwest::Client,
    pds_url: String,
    pacer: Arc<RequestPacer>,
    credentials: Credentials,
    did: String,
    handle: String,
    tokens: Mutex<Tokens>,
}

impl BotSession {
    /// Log in with a handle (or DID) and app password.
    ///
    /// Any failure here is an `Auth` error; the bot can't run without a
    /// session.
    pub async fn login(
        pds_url: &str,
        identifier: &str,
        password: &str,
        pacer: Arc<RequestPacer>,
    ) -> Result<Self, BotError> {
        Self::create(pds_url, identifier, password, pacer)
            .await
            .map_err(|e| BotError::auth(identifier, e))
    }

    async fn create(
        pds_url: &str,
        identifier: &str,
        password: &str,
        pacer: Arc<RequestPacer>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        let pds_url = pds_url.trim_end_matches('/').to_string();

        let session = create_session(&client, &pds_url, &pacer, identifier, password).await?;

        info!(did = %session.did, handle = %session.handle, "Logged in");

        Ok(Self {
            client,
            pds_url,
            pacer,
            credentials: Credentials {
                identifier: identifier.to_string(),
                password: password.to_string(),
            },
            did: session.did,
            handle: session.handle,
            tokens: Mutex::new(Tokens {
                access_jwt: session.access_jwt,
                refresh_jwt: session.refresh_jwt,
            }),
        })
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    /// Handle as reported at login.
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Authenticated XRPC POST. Refreshes the session once on
    /// `ExpiredToken` and retries.
    pub async fn xrpc_post<B, T>(&self, nsid: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let access = self.tokens.lock().await.access_jwt.clone();

        match self.post_with(nsid, &access, body).await {
            Err(err) if is_expired(&err) => {
                debug!(nsid = nsid, "Access token expired, refreshing session");
                let access = self.refresh().await?;
                self.post_with(nsid, &access, body).await
            }
            other => other,
        }
    }

    async fn post_with<B, T>(&self, nsid: &str, bearer: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        with_backoff(&self.pacer, || {
            post_xrpc(&self.client, &self.pds_url, nsid, Some(bearer), Some(body))
        })
        .await
    }

    /// Swap in fresh tokens using the refresh token, or a new login if the
    /// refresh token itself was rejected. Returns the new access token.
    async fn refresh(&self) -> Result<String> {
        let mut tokens = self.tokens.lock().await;
        let refresh_jwt = tokens.refresh_jwt.clone();

        let refreshed: Result<SessionResponse> = with_backoff(&self.pacer, || {
            post_xrpc(
                &self.client,
                &self.pds_url,
                "com.atproto.server.refreshSession",
                Some(refresh_jwt.as_str()),
                None::<&()>,
            )
        })
        .await;

        let session = match refreshed {
            Ok(session) => {
                info!(did = %self.did, "Session refreshed");
                session
            }
            Err(err) if is_session_rejected(&err) => {
                warn!(did = %self.did, error = %err, "Refresh token rejected, logging in again");
                let session = create_session(
                    &self.client,
                    &self.pds_url,
                    &self.pacer,
                    &self.credentials.identifier,
                    &self.credentials.password,
                )
                .await
                .context("Failed to log in again after refresh was rejected")?;
                info!(did = %self.did, "Logged in again");
                session
            }
            Err(err) => return Err(err.context("Failed to refresh session")),
        };

        tokens.access_jwt = session.access_jwt;
        tokens.refresh_jwt = session.refresh_jwt;

        Ok(tokens.access_jwt.clone())
    }

    /// Write a record to the bot's own repo.
    pub async fn create_record<R: Serialize + Sync>(
        &self,
        collection: &str,
        record: &R,
    ) -> Result<PostRef> {
        let body = CreateRecordRequest {
            repo: &self.did,
            collection,
            record,
        };
        self.xrpc_post("com.atproto.repo.createRecord", &body)
            .await
            .with_context(|| format!("Failed to create {collection} record"))
    }
}

fn is_expired(err: &anyhow::Error) -> bool {
    err.downcast_ref::<XrpcError>()
        .is_some_and(XrpcError::is_expired_token)
}

/// The refresh token is dead: expired or revoked.
fn is_session_rejected(err: &anyhow::Error) -> bool {
    err.downcast_ref::<XrpcError>().is_some_and(|x| {
        x.is_expired_token() || x.error.as_deref() == Some("InvalidToken")
    })
}

async fn create_session(
    client: &reqwest::Client,
    pds_url: &str,
    pacer: &RequestPacer,
    identifier: &str,
    password: &str,
) -> Result<SessionResponse> {
    let body = CreateSessionRequest {
        identifier,
        password,
    };
    with_backoff(pacer, || {
        post_xrpc(client, pds_url, "com.atproto.server.createSession", None, Some(&body))
    })
    .await
}

async fn post_xrpc<B, T>(
    client: &reqwest::Client,
    base_url: &str,
    nsid: &str,
    bearer: Option<&str>,
    body: Option<&B>,
) -> Result<T>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let url = format!("{base_url}/xrpc/{nsid}");
    debug!(nsid = nsid, "XRPC POST request");

    let mut request = client.post(&url);
    if let Some(token) = bearer {
        request = request.bearer_auth(token);
    }
    if let Some(body) = body {
        request = request.json(body);
    }

    let response = request
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
