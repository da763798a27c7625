use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use auction_watch::api::AuctionClient;
use auction_watch::config::{AppConfig, CONFIG_PATH};
use auction_watch::notifier::Notifier;
use auction_watch::reporter::{self, JsonLineReporter};
use auction_watch::session::Session;
use auction_watch::storage::{FileStore, KeyValueStore};
use auction_watch::types::ListingSnapshot;

#[derive(Parser)]
#[command(
    name = "auction-watch",
    about = "Watch auction listings and get notified when outbid, winning, or ending soon"
)]
struct Cli {
    /// Path to the config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll watched listings until Ctrl+C
    Run {
        /// Whose bids count (defaults to the logged-in user)
        #[arg(long)]
        user: Option<String>,

        /// Poll interval in seconds (defaults to config)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Start watching a listing
    Watch {
        /// Listing ID
        id: String,
    },
    /// Stop watching a listing
    Unwatch {
        /// Listing ID
        id: String,
    },
    /// Print the watch registry
    List,
    /// Run a single poll cycle and exit
    Poll {
        /// Whose bids count (defaults to the logged-in user)
        #[arg(long)]
        user: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load_or_default(&cli.config)?;
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&config.settings.storage_path));
    let token = Session::access_token(store.as_ref());
    let client = Arc::new(
        AuctionClient::new(
            &config.api.base_url,
            config.api.api_key.as_deref(),
            token.as_deref(),
        )
        .context("failed to build API client")?,
    );
    if config.api.api_key.is_none() {
        warn!("No API key configured; auction endpoints may reject requests");
    }

    let notifier = Notifier::with_window(
        client.clone(),
        Arc::new(JsonLineReporter),
        store.clone(),
        config.settings.ending_soon_window(),
    );

    match cli.command {
        Command::Run { user, interval } => {
            let user = resolve_user(user, store.as_ref());
            let poll_interval = interval
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or_else(|| config.settings.poll_interval());
            info!(
                "Starting auction-watch: user={} storage={}",
                user.as_deref().unwrap_or("<anonymous>"),
                config.settings.storage_path.display()
            );
            notifier.initialize(user, poll_interval);
            info!("Polling every {}s. Press Ctrl+C to stop.", poll_interval.as_secs());

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl+C")?;
            info!("Shutdown signal received");
            notifier.shutdown();
        }
        Command::Watch { id } => {
            notifier.load_registry();
            let listing = client
                .fetch_listing(&id)
                .await
                .with_context(|| format!("failed to read listing {id}"))?
                .with_context(|| format!("listing {id} returned no data"))?;
            let snapshot = ListingSnapshot::from_listing(&listing);
            info!(
                "Watching \"{}\": highest {} by {}, ends {}",
                listing.title,
                snapshot.highest,
                snapshot.highest_bidder_name.as_deref().unwrap_or("-"),
                snapshot
                    .ends_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "unknown".to_string())
            );
            notifier.watch(&id, snapshot);
        }
        Command::Unwatch { id } => {
            notifier.load_registry();
            if notifier.entry(&id).is_none() {
                warn!("Listing {id} was not being watched");
            }
            notifier.unwatch(&id);
        }
        Command::List => {
            notifier.load_registry();
            reporter::report_registry(&notifier.entries());
        }
        Command::Poll { user } => {
            notifier.set_user(resolve_user(user, store.as_ref()));
            notifier.load_registry();
            if let Some(summary) = notifier.poll_all().await {
                info!(
                    "Checked {} listing(s): {} failed, {} empty, {} alert(s)",
                    summary.checked, summary.failed, summary.empty, summary.alerts
                );
            }
        }
    }

    Ok(())
}

/// `--user` wins over the stored login session.
fn resolve_user(flag: Option<String>, store: &dyn KeyValueStore) -> Option<String> {
    flag.or_else(|| Session::user_name(store)).or_else(|| {
        warn!("No user given and no stored session; outbid and win alerts are disabled");
        None
    })
}
