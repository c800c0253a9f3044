// Reply decision logic: who we watch, what we say, and whether we
// already said it.
//
// Nothing in here talks to the network directly. The engine asks a
// ReplyHistory for the bot's recent output and hands back a ReplyDecision;
// the polling driver decides what to do with it.

pub mod engine;
pub mod links;
pub mod table;

/// A post seen in a watched account's feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedPost {
    pub uri: String,
    pub cid: String,
    pub author_handle: String,
    /// True for a top-level `app.bsky.feed.post`. False for replies,
    /// reposts, and records we couldn't decode as a post.
    pub is_plain_text_post: bool,
}

impl ObservedPost {
    /// Strong reference to this post, used as both root and parent of a reply.
    pub fn post_ref(&self) -> PostRef {
        PostRef {
            uri: self.uri.clone(),
            cid: self.cid.clone(),
        }
    }
}

/// An AT Protocol strong reference (`com.atproto.repo.strongRef`).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PostRef {
    pub uri: String,
    pub cid: String,
}

/// Why the engine declined to reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SkipReason {
    /// Author isn't on the watch list (e.g. a repost surfaced in the feed).
    NotWatched,
    /// Post is a reply, a repost, or not a post record at all.
    NotPlainPost,
    /// Our own feed already holds a reply to this post.
    AlreadyReplied,
    /// The dedupe lookup failed, so we assume a reply exists.
    HistoryUnavailable,
    /// Neither a dedicated nor a default reply list exists for the author.
    NoReplyList,
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::NotWatched => "author not watched",
            SkipReason::NotPlainPost => "not a plain post",
            SkipReason::AlreadyReplied => "already replied",
            SkipReason::HistoryUnavailable => "reply history unavailable",
            SkipReason::NoReplyList => "no reply list",
        }
    }
}

/// The engine's verdict for one observed post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyDecision {
    pub should_reply: bool,
    pub text: String,
    /// URL for the link-preview card, when the reply carries one.
    pub link_url: Option<String>,
    /// Set whenever `should_reply` is false.
    pub skip: Option<SkipReason>,
}

impl ReplyDecision {
    pub fn reply(text: String, link_url: Option<String>) -> Self {
        Self {
            should_reply: true,
            text,
            link_url,
            skip: None,
        }
    }

    pub fn skip(reason: SkipReason) -> Self {
        Self {
            should_reply: false,
            text: String::new(),
            link_url: None,
            skip: Some(reason),
        }
    }
}
