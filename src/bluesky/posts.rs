// Feed reads via the public API: watched accounts' latest posts and the
// bot's own recent replies.

use anyhow::{Context, Result};
use async_trait::async_trait;
use atrium_api::app::bsky::feed::defs::FeedViewPost;
use atrium_api::app::bsky::feed::{get_author_feed, post};
use atrium_api::types::TryFromUnknown;
use tracing::debug;

use super::client::PublicAtpClient;
use super::profiles::BotIdentity;
use crate::error::BotError;
use crate::pipeline::{FeedSource, ReplyHistory};
use crate::reply::ObservedPost;

/// getAuthorFeed accepts 1..=100.
const MAX_PAGE: usize = 100;

async fn fetch_feed_page(
    client: &PublicAtpClient,
    handle: &str,
    limit: usize,
) -> Result<get_author_feed::Output> {
    let limit = limit.clamp(1, MAX_PAGE).to_string();
    let params = [("actor", handle), ("limit", limit.as_str())];

    client
        .xrpc_get("app.bsky.feed.getAuthorFeed", &params)
        .await
        .with_context(|| format!("Failed to fetch feed for @{handle}"))
}

fn decode_post(item: &FeedViewPost) -> Option<post::Record> {
    post::Record::try_from_unknown(item.post.record.clone()).ok()
}

/// Convert a feed item into what the decision engine looks at.
///
/// A plain post is an `app.bsky.feed.post` record with no reply reference
/// that showed up without a repost reason.
pub fn observe(item: &FeedViewPost) -> ObservedPost {
    let post_view = &item.post;
    let is_plain_text_post = item.reason.is_none()
        && item.reply.is_none()
        && decode_post(item).is_some_and(|record| record.data.reply.is_none());

    ObservedPost {
        uri: post_view.uri.clone(),
        cid: post_view.cid.as_ref().to_string(),
        author_handle: post_view.author.handle.as_str().to_string(),
        is_plain_text_post,
    }
}

/// Reply-parent URI of a feed item, if it is a reply.
pub fn reply_parent(item: &FeedViewPost) -> Option<String> {
    decode_post(item)
        .and_then(|record| record.data.reply)
        .map(|reply| reply.data.parent.data.uri.clone())
}

/// Latest `limit` posts by `handle`, newest first.
pub async fn fetch_latest_posts(
    client: &PublicAtpClient,
    handle: &str,
    limit: usize,
) -> Result<Vec<ObservedPost>> {
    let output = fetch_feed_page(client, handle, limit).await?;
    let posts: Vec<ObservedPost> = output.feed.iter().take(limit).map(observe).collect();

    debug!(handle = handle, count = posts.len(), "Fetched latest posts");
    Ok(posts)
}

/// Reply parents of `handle`'s `limit` most recent posts, newest first.
pub async fn fetch_reply_parents(
    client: &PublicAtpClient,
    handle: &str,
    limit: usize,
) -> Result<Vec<Option<String>>> {
    let output = fetch_feed_page(client, handle, limit).await?;
    Ok(output.feed.iter().take(limit).map(reply_parent).collect())
}

/// Feed reads for the polling loop, bound to the bot's identity for the
/// self-feed scan.
pub struct PublicFeed {
    client: PublicAtpClient,
    identity: BotIdentity,
}

impl PublicFeed {
    pub fn new(client: PublicAtpClient, identity: BotIdentity) -> Self {
        Self { client, identity }
    }

    pub fn identity(&self) -> &BotIdentity {
        &self.identity
    }
}

#[async_trait]
impl FeedSource for PublicFeed {
    async fn latest_posts(
        &self,
        handle: &str,
        limit: usize,
    ) -> Result<Vec<ObservedPost>, BotError> {
        fetch_latest_posts(&self.client, handle, limit)
            .await
            .map_err(|e| BotError::fetch(handle, e))
    }
}

#[async_trait]
impl ReplyHistory for PublicFeed {
    async fn recent_reply_parents(&self, limit: usize) -> Result<Vec<Option<String>>, BotError> {
        // The DID never changes under us, unlike the handle.
        fetch_reply_parents(&self.client, &self.identity.did, limit)
            .await
            .map_err(|e| BotError::fetch(&self.identity.handle, e))
    }
}
