use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::bluesky::client::DEFAULT_PUBLIC_API_URL;
use crate::bluesky::session::DEFAULT_PDS_URL;
use crate::pipeline::poll::PollSettings;
use crate::reply::engine::DEFAULT_LOOKBACK;

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
#[derive(Debug, Clone)]
pub struct Config {
    /// Dry run: log the replies we would send, send nothing.
    pub dev_mode: bool,
    pub check_interval: Duration,
    pub bluesky_handle: String,
    pub bluesky_app_password: String,
    /// PDS (or entryway) used for login and record writes.
    pub pds_url: String,
    /// Public AppView for feed and profile reads.
    pub public_api_url: String,
    /// JSON file holding the watch list and reply table.
    pub replies_path: PathBuf,
    /// Newest posts per watched account considered each cycle.
    pub posts_per_account: usize,
    /// How many of our own posts the duplicate check scans.
    pub self_feed_lookback: usize,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let dev_mode = match var("DEV_MODE") {
            Some(raw) => parse_bool(&raw).with_context(|| format!("Invalid DEV_MODE: {raw}"))?,
            None => true,
        };

        let interval_secs: u64 = parse_number(&var, "CHECK_INTERVAL", 60)?;
        if interval_secs == 0 {
            anyhow::bail!("CHECK_INTERVAL must be at least 1 second");
        }

        let posts_per_account: usize = parse_number(&var, "POSTS_PER_ACCOUNT", 1)?;
        let self_feed_lookback: usize =
            parse_number(&var, "SELF_FEED_LOOKBACK", DEFAULT_LOOKBACK)?;
        for (name, value) in [
            ("POSTS_PER_ACCOUNT", posts_per_account),
            ("SELF_FEED_LOOKBACK", self_feed_lookback),
        ] {
            if !(1..=100).contains(&value) {
                anyhow::bail!("{name} must be between 1 and 100, got {value}");
            }
        }

        Ok(Self {
            dev_mode,
            check_interval: Duration::from_secs(interval_secs),
            bluesky_handle: var("BLUESKY_HANDLE")
                .map(|h| h.trim().trim_start_matches('@').to_string())
                .unwrap_or_default(),
            bluesky_app_password: var("BLUESKY_APP_PASSWORD")
                .or_else(|| var("BLUESKY_PASSWORD"))
                .unwrap_or_default(),
            pds_url: var("BLUESKY_PDS_URL").unwrap_or_else(|| DEFAULT_PDS_URL.to_string()),
            public_api_url: var("PUBLIC_API_URL")
                .unwrap_or_else(|| DEFAULT_PUBLIC_API_URL.to_string()),
            replies_path: var("REJOINDER_REPLIES")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./replies.json")),
            posts_per_account,
            self_feed_lookback,
        })
    }

    /// Check that the Bluesky handle is configured.
    pub fn require_bluesky(&self) -> Result<()> {
        if self.bluesky_handle.is_empty() {
            anyhow::bail!(
                "BLUESKY_HANDLE not set. Add it to your .env file.\n\
                 See .env.example for the required variables."
            );
        }
        Ok(())
    }

    /// Check that Bluesky auth credentials are configured.
    /// Call this before publishing.
    pub fn require_bluesky_auth(&self) -> Result<()> {
        self.require_bluesky()?;
        if self.bluesky_app_password.is_empty() {
            anyhow::bail!(
                "BLUESKY_APP_PASSWORD not set. Live mode requires authentication.\n\
                 Add it to your .env file, or set DEV_MODE=true for a dry run."
            );
        }
        Ok(())
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            posts_per_account: self.posts_per_account,
            interval: self.check_interval,
        }
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected true or false, got '{other}'"),
    }
}

fn parse_number<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key}: {raw}")),
        None => Ok(default),
    }
}
