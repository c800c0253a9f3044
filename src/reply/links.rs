// URL detection and link placement for reply text.

use std::sync::OnceLock;

use regex_lite::Regex;

use super::table::ReplyTemplate;

/// Characters that end a sentence rather than a URL.
const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', '\'', '"'];

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i:https?)://[^\s<>"]+"#).expect("URL pattern is a valid regex")
    })
}

/// Byte ranges of every URL in `text`, trailing punctuation excluded.
pub fn url_spans(text: &str) -> Vec<(usize, usize)> {
    url_pattern()
        .find_iter(text)
        .filter_map(|m| {
            let url = trim_url(m.as_str());
            // "https://" alone is not a link
            let host_and_path = url.split_once("://").map_or("", |(_, rest)| rest);
            if host_and_path.is_empty() {
                return None;
            }
            Some((m.start(), m.start() + url.len()))
        })
        .collect()
}

/// First URL in `text`, if any.
pub fn find_first_url(text: &str) -> Option<&str> {
    url_spans(text)
        .first()
        .map(|&(start, end)| &text[start..end])
}

fn trim_url(raw: &str) -> &str {
    let mut url = raw.trim_end_matches(TRAILING_PUNCTUATION);
    // A closing paren only belongs to the URL if it opened one too.
    while url.ends_with(')') && url.matches('(').count() < url.matches(')').count() {
        url = url[..url.len() - 1].trim_end_matches(TRAILING_PUNCTUATION);
    }
    url
}

/// Put `link` on its own paragraph ahead of `text`, unless the text
/// already shows it verbatim.
pub fn with_link_prefix(text: &str, link: &str) -> String {
    if text.contains(link) {
        text.to_string()
    } else {
        format!("{link}\n\n{text}")
    }
}

/// Final reply text plus the URL for the preview card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReply {
    pub text: String,
    pub link_url: Option<String>,
}

/// Resolve a template's link (explicit, else first URL in the text) and
/// make sure it shows in-line.
pub fn render(template: &ReplyTemplate) -> RenderedReply {
    let link = template
        .link
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .or_else(|| find_first_url(&template.text));

    match link {
        Some(link) => RenderedReply {
            text: with_link_prefix(&template.text, link),
            link_url: Some(link.to_string()),
        },
        None => RenderedReply {
            text: template.text.clone(),
            link_url: None,
        },
    }
}
