// External collaborators of the reply pipeline.
//
// The Bluesky gateway implements all three; tests swap in fakes.

use async_trait::async_trait;

use crate::error::BotError;
use crate::reply::{ObservedPost, PostRef};

/// Read-only access to a watched account's feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Latest `limit` posts by `handle`, newest first.
    async fn latest_posts(&self, handle: &str, limit: usize)
        -> Result<Vec<ObservedPost>, BotError>;
}

/// The bot's own recent output, used to avoid replying twice.
#[async_trait]
pub trait ReplyHistory: Send + Sync {
    /// Reply-parent URI of each of the bot's `limit` most recent posts,
    /// newest first. `None` for posts that aren't replies.
    async fn recent_reply_parents(&self, limit: usize) -> Result<Vec<Option<String>>, BotError>;
}

/// Write access: post a one-level reply.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Reply to `parent` (used as both root and parent). Returns a
    /// reference to the created post.
    async fn send_reply(
        &self,
        parent: &PostRef,
        text: &str,
        link_url: Option<&str>,
    ) -> Result<PostRef, BotError>;
}
