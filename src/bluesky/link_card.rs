// Link-preview cards (`app.bsky.embed.external`).
//
// Title and description are scraped from the target page on a best-effort
// basis. Any failure falls back to a card that just shows the URL; a missing
// preview never blocks a reply.

use std::time::Duration;

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::debug;

use crate::output::truncate_chars;

const MAX_TITLE_CHARS: usize = 300;
const MAX_DESCRIPTION_CHARS: usize = 1000;

/// Bytes of a page read before parsing. Metadata lives in `<head>`.
const MAX_HTML_BYTES: usize = 512 * 1024;

/// The `external` object of an `app.bsky.embed.external` embed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkCard {
    pub uri: String,
    pub title: String,
    pub description: String,
}

impl LinkCard {
    /// Card with no scraped metadata.
    pub fn bare(url: &str) -> Self {
        Self {
            uri: url.to_string(),
            title: url.to_string(),
            description: String::new(),
        }
    }
}

/// Collapse whitespace and cap the length.
fn clean(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, max_chars)
}

/// First non-blank `content` of the meta tags matching `selector`.
fn meta_content(doc: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    doc.select(&selector)
        .filter_map(|meta| meta.value().attr("content"))
        .map(str::trim)
        .find(|content| !content.is_empty())
        .map(str::to_string)
}

fn extract_title(doc: &Html) -> Option<String> {
    // Priority: og:title → <title>
    if let Some(title) = meta_content(doc, r#"meta[property="og:title"]"#) {
        return Some(title);
    }

    Selector::parse("title")
        .ok()
        .and_then(|s| doc.select(&s).next())
        .map(|title| title.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
}

fn extract_description(doc: &Html) -> Option<String> {
    // Priority: og:description → meta[name=description]
    meta_content(doc, r#"meta[property="og:description"]"#)
        .or_else(|| meta_content(doc, r#"meta[name="description"]"#))
}

/// Build a card from a fetched page.
pub fn parse_link_card(url: &str, html: &str) -> LinkCard {
    let document = Html::parse_document(html);

    let title = extract_title(&document)
        .map(|t| clean(&t, MAX_TITLE_CHARS))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| url.to_string());

    let description = extract_description(&document)
        .map(|d| clean(&d, MAX_DESCRIPTION_CHARS))
        .unwrap_or_default();

    LinkCard {
        uri: url.to_string(),
        title,
        description,
    }
}

/// Scrapes preview metadata for link cards.
pub struct LinkCardFetcher {
    client: reqwest::Client,
}

impl LinkCardFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(super::client::USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Page body, cut off after `MAX_HTML_BYTES`.
    async fn fetch_html(&self, url: &str) -> Result<String> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("Bad status from {url}"))?;

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Failed to read body of {url}"))?
        {
            body.extend_from_slice(&chunk);
            if body.len() >= MAX_HTML_BYTES {
                body.truncate(MAX_HTML_BYTES);
                break;
            }
        }

        // A cut mid-character only loses that character.
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Card for `url`. Never fails: scraping problems give a bare card.
    pub async fn card_for(&self, url: &str) -> LinkCard {
        match self.fetch_html(url).await {
            Ok(html) => parse_link_card(url, &html),
            Err(e) => {
                debug!(url = url, error = %e, "Link preview scrape failed, using bare card");
                LinkCard::bare(url)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_open_graph_tags() {
        let html = r#"<html><head>
            <title>Plain title</title>
            <meta property="og:title" content="OG &amp; Title">
            <meta property="og:description" content="A   short
                description">
        </head></html>"#;
        let card = parse_link_card("https://x.example/y", html);
        assert_eq!(card.title, "OG & Title");
        assert_eq!(card.description, "A short description");
        assert_eq!(card.uri, "https://x.example/y");
    }

    #[test]
    fn falls_back_to_title_and_meta_description() {
        let html = r#"<HTML><TITLE> Page </TITLE>
            <meta content='Described here' name='description'></HTML>"#;
        let card = parse_link_card("https://x.example", html);
        assert_eq!(card.title, "Page");
        assert_eq!(card.description, "Described here");
    }

    #[test]
    fn empty_page_gives_url_title() {
        let card = parse_link_card("https://x.example", "");
        assert_eq!(card, LinkCard::bare("https://x.example"));
    }

    #[test]
    fn entities_are_decoded() {
        let html = r#"<meta property="og:title" content="It&#8217;s &#x201C;news&#x201D; &mdash; today">"#;
        let card = parse_link_card("https://x.example", html);
        assert_eq!(card.title, "It\u{2019}s \u{201C}news\u{201D} \u{2014} today");
    }

    #[test]
    fn blank_og_title_falls_back_to_title_tag() {
        let html = r#"<head><meta property="og:title" content="  "><title>Real</title></head>"#;
        assert_eq!(parse_link_card("https://x.example", html).title, "Real");
    }

    #[test]
    fn long_titles_are_truncated() {
        let html = format!("<title>{}</title>", "a".repeat(400));
        let card = parse_link_card("https://x.example", &html);
        assert_eq!(card.title.chars().count(), MAX_TITLE_CHARS + 3);
    }
}
