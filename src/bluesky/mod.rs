// Bluesky gateway: the concrete FeedSource, ReplyHistory, and Publisher.
//
// Reads go through the public AppView over plain XRPC; writes go through an
// authenticated PDS session. Each submodule handles one area of the API
// surface.

pub mod client;
pub mod link_card;
pub mod pacing;
pub mod posts;
pub mod profiles;
pub mod publish;
pub mod richtext;
pub mod session;
