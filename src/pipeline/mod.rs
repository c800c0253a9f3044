// Polling pipeline: the loop that feeds watched-account posts through the
// decision engine and delivers the replies.

pub mod poll;
pub mod traits;

pub use traits::{FeedSource, Publisher, ReplyHistory};
