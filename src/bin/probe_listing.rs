//! Probe: read a single listing and show what the notifier would derive.
//!
//! Hits GET {base}/auction/listings/<id>?_seller=true&_bids=true and prints:
//! - Latency
//! - Bid count and every bid in response order
//! - The leading bid (tie-break applied) and the end time

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;

use auction_watch::api::AuctionClient;
use auction_watch::config::{AppConfig, CONFIG_PATH};
use auction_watch::session::Session;
use auction_watch::storage::FileStore;
use auction_watch::types::{Bid, ListingSnapshot};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let id = std::env::args()
        .nth(1)
        .context("usage: probe_listing <listing-id>")?;
    let config = AppConfig::load_or_default(Path::new(CONFIG_PATH))?;
    let store = FileStore::new(&config.settings.storage_path);
    let token = Session::access_token(&store);
    let client = AuctionClient::new(
        &config.api.base_url,
        config.api.api_key.as_deref(),
        token.as_deref(),
    )?;

    println!("=== Probe: listing {id} ===");
    println!("URL: {}", client.listing_url(&id)?);
    println!();

    let start = Instant::now();
    let listing = client.fetch_listing(&id).await?;
    println!("Latency: {:?}", start.elapsed());

    let Some(listing) = listing else {
        println!("Response carried no data.");
        return Ok(());
    };

    println!("Title: {}", listing.title);
    println!("Bid count: {}", listing.bids.len());
    for bid in &listing.bids {
        println!(
            "  {:>8}  {:<20} {}",
            bid.amount,
            bid.bidder().unwrap_or("-"),
            bid.created.map(|t| t.to_rfc3339()).unwrap_or_default()
        );
    }
    println!();

    let snapshot = ListingSnapshot::from_listing(&listing);
    println!("Highest:  {}", snapshot.highest);
    println!(
        "Leader:   {}",
        listing.leading_bid().and_then(Bid::bidder).unwrap_or("-")
    );
    match snapshot.ends_at {
        Some(end) => {
            let left = end - Utc::now();
            println!("Ends at:  {} ({} min left)", end.to_rfc3339(), left.num_minutes());
        }
        None => println!("Ends at:  unknown"),
    }

    Ok(())
}
