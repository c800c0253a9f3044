// Request pacing for XRPC calls, with backoff on 429.
//
// Bluesky rate-limits per account and per IP (roughly 3000 requests per
// 5 minutes for reads, tighter hourly budgets for record writes). The bot is
// sequential, so a sliding window plus a minimum gap between requests is
// enough to stay under the limit. A 429 that slips through is retried with
// exponential backoff and jitter.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tokio::time::Instant;
use tracing::{info, warn};

use super::client::XrpcError;

/// Sliding-window pacer shared by every client the bot uses.
pub struct RequestPacer {
    /// Start times of requests still inside the window.
    recent: Mutex<VecDeque<Instant>>,
    max_requests: usize,
    window: Duration,
    min_gap: Duration,
}

impl RequestPacer {
    pub fn new(max_requests: usize, window: Duration, min_gap: Duration) -> Self {
        Self {
            recent: Mutex::new(VecDeque::new()),
            max_requests: max_requests.max(1),
            window,
            min_gap,
        }
    }

    /// Pacing for the public Bluesky endpoints: 3000 per 5 minutes,
    /// at least 100ms apart.
    pub fn bluesky_default() -> Self {
        Self::new(3000, Duration::from_secs(300), Duration::from_millis(100))
    }

    /// How long the next request has to wait, or `None` to go now (in which
    /// case the request is recorded).
    fn reserve(&self, now: Instant) -> Option<Duration> {
        let mut recent = self
            .recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        while recent
            .front()
            .is_some_and(|&oldest| now.duration_since(oldest) >= self.window)
        {
            recent.pop_front();
        }

        if let Some(&last) = recent.back() {
            let since_last = now.duration_since(last);
            if since_last < self.min_gap {
                return Some(self.min_gap - since_last);
            }
        }

        if recent.len() >= self.max_requests {
            let oldest = recent.front().copied().unwrap_or(now);
            return Some((oldest + self.window).duration_since(now));
        }

        recent.push_back(now);
        None
    }

    /// Wait until a request is allowed, then record it.
    pub async fn acquire(&self) {
        while let Some(wait) = self.reserve(Instant::now()) {
            if wait >= Duration::from_secs(1) {
                info!(delay_ms = wait.as_millis() as u64, "Request budget exhausted, pausing");
            }
            tokio::time::sleep(wait).await;
        }
    }

    #[cfg(test)]
    fn in_window(&self) -> usize {
        self.recent.lock().map(|r| r.len()).unwrap_or(0)
    }
}

/// Attempts after the first before a 429 is given up on.
const MAX_RETRIES: u32 = 4;

const BASE_BACKOFF: Duration = Duration::from_secs(2);

const MAX_BACKOFF: Duration = Duration::from_secs(60);

fn is_rate_limited(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<XrpcError>()
            .is_some_and(|x| x.status == 429)
    })
}

fn backoff_for(attempt: u32) -> Duration {
    let backoff = BASE_BACKOFF.saturating_mul(1u32 << attempt.min(16)).min(MAX_BACKOFF);
    let jitter = rand::rng().random_range(0.75..=1.25);
    Duration::from_secs_f64(backoff.as_secs_f64() * jitter)
}

/// Run `operation` through the pacer, retrying on HTTP 429 with
/// exponential backoff. Other errors return immediately.
pub async fn with_backoff<F, Fut, T>(pacer: &RequestPacer, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;

    loop {
        pacer.acquire().await;

        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if is_rate_limited(&err) && attempt < MAX_RETRIES => {
                attempt += 1;
                let wait = backoff_for(attempt);
                warn!(
                    attempt = attempt,
                    max_retries = MAX_RETRIES,
                    backoff_secs = wait.as_secs_f64(),
                    "Rate limited (429), backing off"
                );
                tokio::time::sleep(wait).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn rate_limited() -> anyhow::Error {
        XrpcError {
            nsid: "app.bsky.feed.getAuthorFeed".to_string(),
            status: 429,
            error: Some("RateLimitExceeded".to_string()),
            message: None,
        }
        .into()
    }

    #[tokio::test(start_paused = true)]
    async fn first_request_goes_immediately() {
        let pacer = RequestPacer::new(10, Duration::from_secs(60), Duration::from_millis(100));
        let start = Instant::now();
        pacer.acquire().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(pacer.in_window(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn min_gap_spaces_requests() {
        let pacer = RequestPacer::new(100, Duration::from_secs(60), Duration::from_millis(100));
        let start = Instant::now();
        for _ in 0..4 {
            pacer.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn full_window_waits_for_oldest_to_expire() {
        let pacer = RequestPacer::new(2, Duration::from_secs(10), Duration::ZERO);
        let start = Instant::now();
        pacer.acquire().await;
        pacer.acquire().await;
        pacer.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert_eq!(pacer.in_window(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_429_then_succeeds() {
        let pacer = RequestPacer::new(100, Duration::from_secs(60), Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result = with_backoff(&pacer, || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(rate_limited())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let pacer = RequestPacer::new(100, Duration::from_secs(60), Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_backoff(&pacer, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(rate_limited()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_RETRIES + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let pacer = RequestPacer::new(100, Duration::from_secs(60), Duration::ZERO);
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_backoff(&pacer, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow::anyhow!("connection refused")) }
        })
        .await;

        assert_eq!(result.unwrap_err().to_string(), "connection refused");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rate_limit_detected_through_context() {
        let err = rate_limited().context("Failed to fetch feed");
        assert!(is_rate_limited(&err));
        assert!(!is_rate_limited(&anyhow::anyhow!("HTTP 429-ish text")));
    }
}
