// Reply decision engine.
//
// For each observed post: screen it, check our own feed for an existing
// reply, then pick a canned reply at random. A failed history lookup counts
// as "already replied". Missing a reply is cheaper than posting a duplicate.

use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{debug, warn};

use super::links;
use super::table::{ReplyBook, ReplyTable, WatchList};
use super::{ObservedPost, ReplyDecision, SkipReason};
use crate::pipeline::ReplyHistory;

/// Default number of our own recent posts scanned for existing replies.
/// Also the getAuthorFeed page maximum.
pub const DEFAULT_LOOKBACK: usize = 100;

pub struct DecisionEngine {
    watch: WatchList,
    table: ReplyTable,
    lookback: usize,
}

impl DecisionEngine {
    pub fn new(book: ReplyBook, lookback: usize) -> Self {
        Self {
            watch: book.watch,
            table: book.table,
            lookback: lookback.max(1),
        }
    }

    pub fn watch_list(&self) -> &WatchList {
        &self.watch
    }

    pub fn table(&self) -> &ReplyTable {
        &self.table
    }

    /// Decide whether and how to reply to `post`.
    pub async fn decide<R: Rng + ?Sized>(
        &self,
        post: &ObservedPost,
        history: &dyn ReplyHistory,
        rng: &mut R,
    ) -> ReplyDecision {
        if let Some(reason) = self.screen(post) {
            debug!(uri = %post.uri, reason = reason.label(), "Skipping post");
            return ReplyDecision::skip(reason);
        }

        if let Some(reason) = self.existing_reply(&post.uri, history).await {
            return ReplyDecision::skip(reason);
        }

        self.compose(&post.author_handle, rng)
    }

    /// Cheap checks that need no network: watched author, plain post.
    pub fn screen(&self, post: &ObservedPost) -> Option<SkipReason> {
        if !self.watch.contains(&post.author_handle) {
            Some(SkipReason::NotWatched)
        } else if !post.is_plain_text_post {
            Some(SkipReason::NotPlainPost)
        } else {
            None
        }
    }

    /// Scan our recent output for a reply to `post_uri`.
    ///
    /// Returns `None` only when the history was read and holds no such
    /// reply. A lookup error resolves to `HistoryUnavailable`, which callers
    /// must treat as a duplicate.
    pub async fn existing_reply(
        &self,
        post_uri: &str,
        history: &dyn ReplyHistory,
    ) -> Option<SkipReason> {
        match history.recent_reply_parents(self.lookback).await {
            Ok(parents) => {
                let replied = parents
                    .iter()
                    .flatten()
                    .any(|parent| parent == post_uri);
                if replied {
                    debug!(uri = post_uri, "Already replied");
                    Some(SkipReason::AlreadyReplied)
                } else {
                    None
                }
            }
            Err(e) => {
                warn!(uri = post_uri, error = %e, "Reply history check failed, assuming already replied");
                Some(SkipReason::HistoryUnavailable)
            }
        }
    }

    /// Pick a reply for `author` and place its link.
    pub fn compose<R: Rng + ?Sized>(&self, author: &str, rng: &mut R) -> ReplyDecision {
        match self.table.templates_for(author).choose(rng) {
            Some(template) => {
                let rendered = links::render(template);
                ReplyDecision::reply(rendered.text, rendered.link_url)
            }
            // ReplyBook::check_coverage rules this out for watched accounts.
            None => {
                warn!(author = author, "No reply list for account");
                ReplyDecision::skip(SkipReason::NoReplyList)
            }
        }
    }
}
