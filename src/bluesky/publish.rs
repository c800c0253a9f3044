// Reply publishing: builds the `app.bsky.feed.post` record and writes it to
// the bot's repo.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use super::link_card::{LinkCard, LinkCardFetcher};
use super::richtext::{link_facets, Facet};
use super::session::BotSession;
use crate::error::BotError;
use crate::pipeline::Publisher;
use crate::reply::PostRef;

pub const POST_COLLECTION: &str = "app.bsky.feed.post";

#[derive(Debug, Clone, Serialize)]
pub struct ReplyRefs {
    pub root: PostRef,
    pub parent: PostRef,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "$type")]
pub enum Embed {
    #[serde(rename = "app.bsky.embed.external")]
    External { external: LinkCard },
}

/// An `app.bsky.feed.post` record, reply variant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRecord {
    #[serde(rename = "$type")]
    pub record_type: &'static str,
    pub text: String,
    pub created_at: String,
    pub reply: ReplyRefs,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
}

/// Build a flat one-level reply: root and parent both point at `parent`.
pub fn build_reply_record(
    parent: &PostRef,
    text: &str,
    card: Option<LinkCard>,
    created_at: chrono::DateTime<Utc>,
) -> ReplyRecord {
    ReplyRecord {
        record_type: POST_COLLECTION,
        text: text.to_string(),
        created_at: created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        reply: ReplyRefs {
            root: parent.clone(),
            parent: parent.clone(),
        },
        facets: link_facets(text),
        embed: card.map(|external| Embed::External { external }),
    }
}

/// Publishes replies through a logged-in session.
pub struct SessionPublisher {
    session: BotSession,
    cards: LinkCardFetcher,
}

impl SessionPublisher {
    pub fn new(session: BotSession, cards: LinkCardFetcher) -> Self {
        Self { session, cards }
    }

    pub fn session(&self) -> &BotSession {
        &self.session
    }
}

#[async_trait]
impl Publisher for SessionPublisher {
    async fn send_reply(
        &self,
        parent: &PostRef,
        text: &str,
        link_url: Option<&str>,
    ) -> Result<PostRef, BotError> {
        let card = match link_url {
            Some(url) => Some(self.cards.card_for(url).await),
            None => None,
        };

        let record = build_reply_record(parent, text, card, Utc::now());

        self.session
            .create_record(POST_COLLECTION, &record)
            .await
            .map_err(|e| BotError::publish(&parent.uri, e))
    }
}
