use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use colored::Colorize;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use rejoinder::bluesky::client::PublicAtpClient;
use rejoinder::bluesky::link_card::LinkCardFetcher;
use rejoinder::bluesky::pacing::RequestPacer;
use rejoinder::bluesky::posts::{fetch_latest_posts, PublicFeed};
use rejoinder::bluesky::profiles::resolve_identity;
use rejoinder::bluesky::publish::SessionPublisher;
use rejoinder::bluesky::session::BotSession;
use rejoinder::config::Config;
use rejoinder::error::BotError;
use rejoinder::output::terminal;
use rejoinder::pipeline::poll::{Delivery, Poller};
use rejoinder::pipeline::ReplyHistory;
use rejoinder::reply::engine::DecisionEngine;
use rejoinder::reply::table::ReplyBook;

/// Rejoinder: canned replies to watched Bluesky accounts.
///
/// Polls each watched account for new posts and answers with a reply
/// picked at random from its list, never replying twice to the same post.
#[derive(Parser)]
#[command(name = "rejoinder", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll watched accounts and reply to new posts
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,

        /// Publish replies even if DEV_MODE is set
        #[arg(long)]
        live: bool,
    },

    /// Validate the replies file and show what will be watched
    Check,

    /// Show what the bot would reply to an account's latest posts
    Preview {
        /// The handle to preview (e.g. someone.bsky.social)
        handle: String,

        /// Number of recent posts to evaluate (default: 5)
        #[arg(long, default_value = "5")]
        count: usize,
    },
}

/// History for previews run without a bot account: nothing replied yet.
struct NoReplies;

#[async_trait]
impl ReplyHistory for NoReplies {
    async fn recent_reply_parents(&self, _limit: usize) -> Result<Vec<Option<String>>, BotError> {
        Ok(Vec::new())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("rejoinder=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { once, live } => {
            let config = Config::load()?;
            let book = load_book(&config)?;
            let dry_run = config.dev_mode && !live;

            let pacer = Arc::new(RequestPacer::bluesky_default());
            let client = PublicAtpClient::new(&config.public_api_url, pacer.clone())?;

            // Live mode logs in first: a rejected login stops here.
            let publisher = if dry_run {
                config.require_bluesky()?;
                println!(
                    "{}",
                    "DEV_MODE: replies will be printed, not posted.".yellow()
                );
                None
            } else {
                config.require_bluesky_auth()?;
                let session = BotSession::login(
                    &config.pds_url,
                    &config.bluesky_handle,
                    &config.bluesky_app_password,
                    pacer.clone(),
                )
                .await?;
                println!("Logged in as @{}", session.handle());
                Some(SessionPublisher::new(session, LinkCardFetcher::new()?))
            };

            let actor = match &publisher {
                Some(p) => p.session().did().to_string(),
                None => config.bluesky_handle.clone(),
            };
            let identity = resolve_identity(&client, &actor).await?;
            let feed = PublicFeed::new(client, identity);

            let engine = DecisionEngine::new(book, config.self_feed_lookback);
            let delivery = match &publisher {
                Some(p) => Delivery::Live(p),
                None => Delivery::DryRun,
            };
            let poller = Poller::new(&engine, &feed, &feed, delivery, config.poll_settings());

            info!(
                accounts = engine.watch_list().len(),
                bot = %feed.identity().handle,
                dry_run = dry_run,
                "Starting reply loop"
            );

            if once {
                poller.run_once().await;
            } else {
                poller.run().await;
            }
        }

        Commands::Check => {
            let config = Config::load()?;
            let book = ReplyBook::load(&config.replies_path)?;
            let warnings = book.warnings();

            println!("Replies file: {}", config.replies_path.display());
            println!(
                "Mode: {}, every {}s, {} post(s) per account, dedupe window {}",
                if config.dev_mode {
                    "dry run".yellow()
                } else {
                    "live".red().bold()
                },
                config.check_interval.as_secs(),
                config.posts_per_account,
                config.self_feed_lookback,
            );
            terminal::display_reply_book(&book, &warnings);
        }

        Commands::Preview { handle, count } => {
            let config = Config::load()?;
            let book = load_book(&config)?;

            let pacer = Arc::new(RequestPacer::bluesky_default());
            let client = PublicAtpClient::new(&config.public_api_url, pacer)?;
            let posts = fetch_latest_posts(&client, &handle, count.clamp(1, 100)).await?;

            if posts.is_empty() {
                println!("No posts found for @{handle}.");
                return Ok(());
            }

            let engine = DecisionEngine::new(book, config.self_feed_lookback);
            let mut rng = StdRng::from_os_rng();

            // With a bot handle configured, check its real reply history.
            if config.bluesky_handle.is_empty() {
                println!(
                    "{}",
                    "BLUESKY_HANDLE not set: previewing without reply history.".dimmed()
                );
                for post in &posts {
                    let decision = engine.decide(post, &NoReplies, &mut rng).await;
                    terminal::display_preview(post, &decision);
                }
            } else {
                let identity = resolve_identity(&client, &config.bluesky_handle).await?;
                let feed = PublicFeed::new(client, identity);
                for post in &posts {
                    let decision = engine.decide(post, &feed, &mut rng).await;
                    terminal::display_preview(post, &decision);
                }
            }
        }
    }

    Ok(())
}

/// Load the replies file and surface its warnings in the log.
fn load_book(config: &Config) -> Result<ReplyBook> {
    let book = ReplyBook::load(&config.replies_path)?;
    for warning in book.warnings() {
        warn!("{warning}");
    }
    Ok(book)
}
