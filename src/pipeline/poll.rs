// Polling driver.
//
// Each cycle walks the watch list in order, fetches each account's latest
// posts, and runs them through the decision engine one at a time. Failures
// are contained to the account or post they happen on. Between cycles we
// sleep; a Ctrl-C stops the loop at the next gap between cycles.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::traits::{FeedSource, Publisher, ReplyHistory};
use crate::output::terminal;
use crate::reply::engine::DecisionEngine;
use crate::reply::{ObservedPost, ReplyDecision, SkipReason};

/// Where replies go.
#[derive(Clone, Copy)]
pub enum Delivery<'a> {
    /// Print what would be posted, post nothing.
    DryRun,
    Live(&'a dyn Publisher),
}

impl Delivery<'_> {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, Delivery::DryRun)
    }
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    /// How many of each account's newest posts to consider per cycle.
    pub posts_per_account: usize,
    /// Sleep between cycles.
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            posts_per_account: 1,
            interval: Duration::from_secs(60),
        }
    }
}

/// Tally of one polling cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub accounts_checked: usize,
    pub accounts_failed: usize,
    pub posts_seen: usize,
    pub replies_sent: usize,
    pub dry_run_replies: usize,
    pub publish_failures: usize,
    pub skipped: BTreeMap<SkipReason, usize>,
}

impl CycleReport {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }

    fn record_skip(&mut self, reason: SkipReason) {
        *self.skipped.entry(reason).or_default() += 1;
    }
}

pub struct Poller<'a> {
    engine: &'a DecisionEngine,
    feed: &'a dyn FeedSource,
    history: &'a dyn ReplyHistory,
    delivery: Delivery<'a>,
    settings: PollSettings,
}

impl<'a> Poller<'a> {
    pub fn new(
        engine: &'a DecisionEngine,
        feed: &'a dyn FeedSource,
        history: &'a dyn ReplyHistory,
        delivery: Delivery<'a>,
        settings: PollSettings,
    ) -> Self {
        Self {
            engine,
            feed,
            history,
            delivery,
            settings,
        }
    }

    /// A single cycle with a fresh random source, summary printed.
    pub async fn run_once(&self) -> CycleReport {
        let mut rng = StdRng::from_os_rng();
        let report = self.run_cycle(&mut rng).await;
        terminal::display_cycle_summary(&report, self.delivery.is_dry_run());
        report
    }

    /// Run cycles until Ctrl-C.
    ///
    /// The listener is installed once, up front, so a Ctrl-C that lands
    /// mid-cycle is held until the cycle finishes.
    pub async fn run(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    let _ = tx.send(());
                }
                Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
            }
        });

        self.run_until(async {
            // No listener means no shutdown request, not an immediate one.
            if rx.await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run cycles until `shutdown` completes, checking it only between
    /// cycles. Returns the number of cycles run.
    pub async fn run_until<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut rng = StdRng::from_os_rng();
        let mut cycles = 0;

        loop {
            let report = self.run_cycle(&mut rng).await;
            cycles += 1;
            terminal::display_cycle_summary(&report, self.delivery.is_dry_run());

            info!(
                interval_secs = self.settings.interval.as_secs(),
                "Waiting before next check"
            );

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(cycles = cycles, "Shutdown requested, stopping");
                    return cycles;
                }
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }
    }

    /// One pass over every watched account.
    pub async fn run_cycle<R: Rng + ?Sized>(&self, rng: &mut R) -> CycleReport {
        let mut report = CycleReport::default();

        for handle in self.engine.watch_list().iter() {
            info!(handle = handle, "Checking posts");
            report.accounts_checked += 1;

            let posts = match self
                .feed
                .latest_posts(handle, self.settings.posts_per_account)
                .await
            {
                Ok(posts) => posts,
                Err(e) => {
                    warn!(handle = handle, error = %e, "Failed to fetch posts, skipping account");
                    report.accounts_failed += 1;
                    continue;
                }
            };

            // Feeds may return more than asked for; only the newest count.
            for post in posts.iter().take(self.settings.posts_per_account) {
                report.posts_seen += 1;
                let decision = self.engine.decide(post, self.history, rng).await;
                self.deliver(post, &decision, &mut report).await;
            }
        }

        report
    }

    async fn deliver(&self, post: &ObservedPost, decision: &ReplyDecision, report: &mut CycleReport) {
        if !decision.should_reply {
            if let Some(reason) = decision.skip {
                report.record_skip(reason);
            }
            return;
        }

        match self.delivery {
            Delivery::DryRun => {
                terminal::display_dry_run(post, decision);
                report.dry_run_replies += 1;
            }
            Delivery::Live(publisher) => {
                match publisher
                    .send_reply(&post.post_ref(), &decision.text, decision.link_url.as_deref())
                    .await
                {
                    Ok(created) => {
                        info!(parent = %post.uri, reply = %created.uri, "Replied");
                        report.replies_sent += 1;
                    }
                    Err(e) => {
                        warn!(uri = %post.uri, error = %e, "Failed to send reply");
                        report.publish_failures += 1;
                    }
                }
            }
        }
    }
}
