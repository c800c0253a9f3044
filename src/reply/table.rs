// Watch list and reply table, loaded from the replies JSON file.
//
// File shape:
//
//   {
//     "accounts": ["alice.example", "bob.example"],
//     "replies": {
//       "default": ["text", {"text": "more text", "link": "https://..."}],
//       "alice.example": ["..."]
//     }
//   }

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Key of the fallback reply list.
pub const DEFAULT_KEY: &str = "default";

/// Character budget `ReplyBook::warnings` checks replies against.
///
/// Bluesky's own limit is 300 graphemes. Counting chars instead can only
/// overcount (an emoji ZWJ sequence is several chars, one grapheme), so a
/// warning here means "may be too long", never a missed overrun.
pub const MAX_POST_CHARS: usize = 300;

/// Canonical form for comparing handles: trimmed, no leading `@`, lowercase.
pub fn normalize_handle(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_ascii_lowercase()
}

/// One canned reply. In the file it's either a bare string or an object
/// with an explicit link for the preview card.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawTemplate")]
pub struct ReplyTemplate {
    pub text: String,
    pub link: Option<String>,
}

impl ReplyTemplate {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link: None,
        }
    }

    pub fn linked(text: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            link: Some(link.into()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTemplate {
    Plain(String),
    Linked { text: String, link: Option<String> },
}

impl From<RawTemplate> for ReplyTemplate {
    fn from(raw: RawTemplate) -> Self {
        match raw {
            RawTemplate::Plain(text) => ReplyTemplate { text, link: None },
            RawTemplate::Linked { text, link } => ReplyTemplate { text, link },
        }
    }
}

/// Ordered set of accounts to poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchList {
    handles: Vec<String>,
}

impl WatchList {
    /// Build from raw handles. Order is kept; duplicates after
    /// normalization are dropped.
    pub fn new<I, S>(handles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for handle in handles {
            let handle = normalize_handle(handle.as_ref());
            if !handle.is_empty() && !out.contains(&handle) {
                out.push(handle);
            }
        }
        Self { handles: out }
    }

    pub fn contains(&self, handle: &str) -> bool {
        let handle = normalize_handle(handle);
        self.handles.iter().any(|h| *h == handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.handles.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// Handle → reply templates, with an optional `default` fallback list.
#[derive(Debug, Clone)]
pub struct ReplyTable {
    entries: HashMap<String, Vec<ReplyTemplate>>,
}

impl ReplyTable {
    /// Validate and build a table. Fails if any list is empty or holds a
    /// blank reply.
    pub fn new(entries: HashMap<String, Vec<ReplyTemplate>>) -> Result<Self> {
        let mut normalized = HashMap::with_capacity(entries.len());
        for (key, templates) in entries {
            let key = normalize_handle(&key);
            if templates.is_empty() {
                anyhow::bail!("Reply list for '{key}' is empty");
            }
            if let Some(blank) = templates.iter().position(|t| t.text.trim().is_empty()) {
                anyhow::bail!("Reply #{} for '{key}' has no text", blank + 1);
            }
            normalized.insert(key, templates);
        }

        Ok(Self {
            entries: normalized,
        })
    }

    /// Convenience for plain-text tables.
    pub fn from_texts<I, K, V>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            entries
                .into_iter()
                .map(|(k, texts)| {
                    (
                        k.into(),
                        texts.into_iter().map(ReplyTemplate::plain).collect(),
                    )
                })
                .collect(),
        )
    }

    /// Templates for `handle`, or the default list if it has none.
    /// Empty only when neither exists.
    pub fn templates_for(&self, handle: &str) -> &[ReplyTemplate] {
        self.entries
            .get(&normalize_handle(handle))
            .or_else(|| self.entries.get(DEFAULT_KEY))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn has_dedicated(&self, handle: &str) -> bool {
        let handle = normalize_handle(handle);
        handle != DEFAULT_KEY && self.entries.contains_key(&handle)
    }

    /// Keys in sorted order, `default` first.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_by_key(|k| (*k != DEFAULT_KEY, *k));
        keys
    }
}

/// Everything the replies file provides.
#[derive(Debug, Clone)]
pub struct ReplyBook {
    pub watch: WatchList,
    pub table: ReplyTable,
}

#[derive(Deserialize)]
struct ReplyBookFile {
    accounts: Vec<String>,
    replies: HashMap<String, Vec<ReplyTemplate>>,
}

impl ReplyBook {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replies file {}", path.display()))?;
        Self::from_json(&json)
            .with_context(|| format!("Invalid replies file {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: ReplyBookFile =
            serde_json::from_str(json).context("Failed to parse replies JSON")?;

        let watch = WatchList::new(&file.accounts);
        if watch.is_empty() {
            anyhow::bail!("No accounts to watch");
        }

        let book = Self {
            watch,
            table: ReplyTable::new(file.replies)?,
        };
        book.check_coverage()?;
        Ok(book)
    }

    /// Every watched account must resolve to a reply list, its own or the
    /// default one.
    pub fn check_coverage(&self) -> Result<()> {
        let uncovered: Vec<&str> = self
            .watch
            .iter()
            .filter(|handle| self.table.templates_for(handle).is_empty())
            .collect();
        if !uncovered.is_empty() {
            anyhow::bail!(
                "No '{DEFAULT_KEY}' list and no replies for: {}",
                uncovered.join(", ")
            );
        }
        Ok(())
    }

    /// Non-fatal problems worth showing the operator.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for key in self.table.keys() {
            for (i, template) in self.table.templates_for(key).iter().enumerate() {
                let rendered = super::links::render(template);
                let chars = rendered.text.chars().count();
                if chars > MAX_POST_CHARS {
                    warnings.push(format!(
                        "'{key}' reply #{} is {chars} characters (limit {MAX_POST_CHARS}; \
                         combined emoji count as several)",
                        i + 1
                    ));
                }
            }
        }

        for key in self.table.keys() {
            if key != DEFAULT_KEY && !self.watch.contains(key) {
                warnings.push(format!(
                    "'{key}' has replies but is not in the watch list"
                ));
            }
        }

        warnings
    }
}
