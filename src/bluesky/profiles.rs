// Bot identity resolution.
//
// The bot's handle is looked up once at startup and passed around as an
// immutable value. Nothing re-resolves it mid-run.

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use super::client::PublicAtpClient;

/// Who the bot is: stable DID plus the handle current at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub did: String,
    pub handle: String,
}

#[derive(Deserialize)]
struct ProfileResponse {
    did: String,
    handle: String,
}

/// Resolve `actor` (a DID or handle) to the account's DID and current handle.
pub async fn resolve_identity(client: &PublicAtpClient, actor: &str) -> Result<BotIdentity> {
    let profile: ProfileResponse = client
        .xrpc_get("app.bsky.actor.getProfile", &[("actor", actor)])
        .await
        .with_context(|| format!("Failed to look up profile for {actor}"))?;

    info!(did = %profile.did, handle = %profile.handle, "Resolved bot identity");

    Ok(BotIdentity {
        did: profile.did,
        handle: profile.handle,
    })
}
