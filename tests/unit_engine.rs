// Unit tests for the reply decision engine.
//
// Covers screening, the duplicate check (including its fail-safe on lookup
// errors), reply selection with default fallback, and link placement. The
// reply history is a hand-written fake; nothing touches the network.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;

use rejoinder::error::BotError;
use rejoinder::pipeline::ReplyHistory;
use rejoinder::reply::engine::DecisionEngine;
use rejoinder::reply::table::{ReplyBook, ReplyTable, ReplyTemplate, WatchList};
use rejoinder::reply::{ObservedPost, ReplyDecision, SkipReason};

// ============================================================
// Fakes and builders
// ============================================================

struct FakeHistory {
    parents: Vec<Option<String>>,
    fail: bool,
    calls: AtomicUsize,
    last_limit: AtomicUsize,
}

impl FakeHistory {
    fn empty() -> Self {
        Self::with_parents(vec![])
    }

    fn with_parents(parents: Vec<Option<&str>>) -> Self {
        Self {
            parents: parents.into_iter().map(|p| p.map(String::from)).collect(),
            fail: false,
            calls: AtomicUsize::new(0),
            last_limit: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::empty()
        }
    }
}

#[async_trait]
impl ReplyHistory for FakeHistory {
    async fn recent_reply_parents(&self, limit: usize) -> Result<Vec<Option<String>>, BotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_limit.store(limit, Ordering::SeqCst);
        if self.fail {
            return Err(BotError::fetch(
                "bot.example",
                anyhow::anyhow!("connection reset"),
            ));
        }
        Ok(self.parents.clone())
    }
}

fn post(uri: &str, author: &str) -> ObservedPost {
    ObservedPost {
        uri: uri.to_string(),
        cid: "bafyreibg3opltomth7xk6rjt5zxbc2pbkbu64an4kgghjkudr2pwcg4wom".to_string(),
        author_handle: author.to_string(),
        is_plain_text_post: true,
    }
}

fn engine(watch: &[&str], table: ReplyTable) -> DecisionEngine {
    DecisionEngine::new(
        ReplyBook {
            watch: WatchList::new(watch),
            table,
        },
        100,
    )
}

/// Watches `a.example` with a single dedicated reply and no default list.
fn simple_engine() -> DecisionEngine {
    engine(
        &["a.example"],
        ReplyTable::from_texts([("a.example", vec!["hello world"])]).unwrap(),
    )
}

fn rng() -> StdRng {
    StdRng::seed_from_u64(7)
}

// ============================================================
// End-to-end scenarios
// ============================================================

#[tokio::test]
async fn replies_when_no_prior_reply_exists() {
    let engine = simple_engine();
    let history = FakeHistory::with_parents(vec![None, Some("at://other")]);

    let decision = engine
        .decide(&post("at://P", "a.example"), &history, &mut rng())
        .await;

    assert_eq!(
        decision,
        ReplyDecision {
            should_reply: true,
            text: "hello world".to_string(),
            link_url: None,
            skip: None,
        }
    );
}

#[tokio::test]
async fn skips_when_prior_reply_matches_parent() {
    let engine = simple_engine();
    let history = FakeHistory::with_parents(vec![None, Some("at://P")]);

    let decision = engine
        .decide(&post("at://P", "a.example"), &history, &mut rng())
        .await;

    assert!(!decision.should_reply);
    assert_eq!(decision.skip, Some(SkipReason::AlreadyReplied));
}

#[tokio::test]
async fn url_already_in_text_leaves_text_unchanged() {
    let engine = engine(
        &["a.example"],
        ReplyTable::from_texts([("default", vec!["Check this https://x.example/y out"])]).unwrap(),
    );

    let decision = engine
        .decide(&post("at://P", "a.example"), &FakeHistory::empty(), &mut rng())
        .await;

    assert!(decision.should_reply);
    assert_eq!(decision.text, "Check this https://x.example/y out");
    assert_eq!(decision.link_url.as_deref(), Some("https://x.example/y"));
}

// ============================================================
// Screening
// ============================================================

#[tokio::test]
async fn unwatched_author_is_never_replied_to() {
    let engine = simple_engine();
    let history = FakeHistory::empty();

    for author in ["b.example", "default", "", "a.example.evil"] {
        let decision = engine
            .decide(&post("at://P", author), &history, &mut rng())
            .await;
        assert!(!decision.should_reply, "replied to {author:?}");
        assert_eq!(decision.skip, Some(SkipReason::NotWatched));
    }
    // Screening happens before the history lookup.
    assert_eq!(history.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn author_match_ignores_case_and_at_sign() {
    let engine = engine(
        &["@A.Example"],
        ReplyTable::from_texts([("default", vec!["hi"])]).unwrap(),
    );

    let decision = engine
        .decide(&post("at://P", "a.EXAMPLE"), &FakeHistory::empty(), &mut rng())
        .await;

    assert!(decision.should_reply);
}

#[tokio::test]
async fn non_plain_posts_are_skipped() {
    let engine = simple_engine();
    let history = FakeHistory::empty();
    let mut reply = post("at://P", "a.example");
    reply.is_plain_text_post = false;

    let decision = engine.decide(&reply, &history, &mut rng()).await;

    assert!(!decision.should_reply);
    assert_eq!(decision.skip, Some(SkipReason::NotPlainPost));
    assert_eq!(history.calls.load(Ordering::SeqCst), 0);
}

// ============================================================
// Duplicate check
// ============================================================

#[tokio::test]
async fn failed_history_lookup_blocks_the_reply() {
    let engine = simple_engine();

    let decision = engine
        .decide(&post("at://P", "a.example"), &FakeHistory::failing(), &mut rng())
        .await;

    assert!(!decision.should_reply);
    assert_eq!(decision.skip, Some(SkipReason::HistoryUnavailable));
}

#[tokio::test]
async fn rerunning_on_a_replied_post_never_replies_again() {
    let engine = simple_engine();
    let history = FakeHistory::with_parents(vec![Some("at://P")]);
    let target = post("at://P", "a.example");
    let mut rng = rng();

    for _ in 0..5 {
        let decision = engine.decide(&target, &history, &mut rng).await;
        assert!(!decision.should_reply);
    }
    assert_eq!(history.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn history_is_queried_with_the_lookback_window() {
    let engine = DecisionEngine::new(
        ReplyBook {
            watch: WatchList::new(["a.example"]),
            table: ReplyTable::from_texts([("default", vec!["hi"])]).unwrap(),
        },
        25,
    );
    let history = FakeHistory::empty();

    engine
        .decide(&post("at://P", "a.example"), &history, &mut rng())
        .await;

    assert_eq!(history.last_limit.load(Ordering::SeqCst), 25);
}

#[tokio::test]
async fn parent_match_is_exact() {
    let engine = simple_engine();
    let history = FakeHistory::with_parents(vec![Some("at://P2"), Some("at://")]);

    let decision = engine
        .decide(&post("at://P", "a.example"), &history, &mut rng())
        .await;

    assert!(decision.should_reply);
}

// ============================================================
// Reply selection
// ============================================================

#[test]
fn account_without_entry_draws_only_from_default() {
    let defaults = ["d1", "d2", "d3"];
    let engine = engine(
        &["a.example", "b.example"],
        ReplyTable::from_texts([("default", defaults.to_vec()), ("a.example", vec!["only a"])])
            .unwrap(),
    );
    let mut rng = rng();

    for _ in 0..200 {
        let decision = engine.compose("b.example", &mut rng);
        assert!(defaults.contains(&decision.text.as_str()), "got {}", decision.text);
    }
}

#[test]
fn dedicated_list_is_used_exclusively() {
    let engine = engine(
        &["a.example"],
        ReplyTable::from_texts([("default", vec!["d"]), ("a.example", vec!["a1", "a2"])]).unwrap(),
    );
    let mut rng = rng();

    for _ in 0..200 {
        let text = engine.compose("a.example", &mut rng).text;
        assert!(text == "a1" || text == "a2", "got {text}");
    }
}

#[test]
fn selection_covers_the_whole_list() {
    let engine = engine(
        &["a.example"],
        ReplyTable::from_texts([("default", vec!["x", "y", "z"])]).unwrap(),
    );
    let mut rng = rng();
    let mut seen = std::collections::HashSet::new();

    for _ in 0..300 {
        seen.insert(engine.compose("a.example", &mut rng).text);
    }
    assert_eq!(seen.len(), 3);
}

// ============================================================
// Link placement
// ============================================================

#[test]
fn explicit_link_missing_from_text_is_prepended_once() {
    let mut entries = std::collections::HashMap::new();
    entries.insert(
        "default".to_string(),
        vec![ReplyTemplate::linked("Worth a read.", "https://x.example/y")],
    );
    let engine = engine(&["a.example"], ReplyTable::new(entries).unwrap());

    let decision = engine.compose("a.example", &mut rng());

    assert_eq!(decision.text, "https://x.example/y\n\nWorth a read.");
    assert_eq!(decision.text.matches("https://x.example/y").count(), 1);
    assert_eq!(decision.link_url.as_deref(), Some("https://x.example/y"));
}

#[test]
fn explicit_link_already_in_text_is_not_duplicated() {
    let mut entries = std::collections::HashMap::new();
    entries.insert(
        "default".to_string(),
        vec![ReplyTemplate::linked(
            "See https://x.example/y for more",
            "https://x.example/y",
        )],
    );
    let engine = engine(&["a.example"], ReplyTable::new(entries).unwrap());

    let decision = engine.compose("a.example", &mut rng());

    assert_eq!(decision.text, "See https://x.example/y for more");
}

#[test]
fn account_without_any_list_is_skipped() {
    let engine = engine(
        &["a.example", "b.example"],
        ReplyTable::from_texts([("a.example", vec!["hi"])]).unwrap(),
    );

    let decision = engine.compose("b.example", &mut rng());

    assert!(!decision.should_reply);
    assert_eq!(decision.skip, Some(SkipReason::NoReplyList));
}

#[test]
fn text_without_links_has_no_card() {
    let decision = simple_engine().compose("a.example", &mut rng());
    assert_eq!(decision.link_url, None);
}
