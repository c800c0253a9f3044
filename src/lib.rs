// Rejoinder: canned-reply bot for watched Bluesky accounts.
//
// This is the library root. The decision logic (reply) knows nothing about
// HTTP; the Bluesky gateway (bluesky) implements the pipeline's traits.

pub mod bluesky;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod reply;
