//! login: authenticate against the auction API and store the session.
//!
//! Stores the access token and profile in the local store so that
//! `auction-watch` can attach the token to requests and knows whose bids
//! to track.
//!
//! By default, reads the password interactively (hidden input) to avoid
//! leaking it into shell history. Use `--password` only for scripted/CI use.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;

use auction_watch::api::AuctionClient;
use auction_watch::config::{AppConfig, CONFIG_PATH};
use auction_watch::session::Session;
use auction_watch::storage::FileStore;

#[derive(Parser)]
#[command(name = "login", about = "Log in and save the session for auction-watch")]
struct Cli {
    /// Account email
    #[arg(long, required_unless_present = "logout")]
    email: Option<String>,

    /// Account password. If omitted, reads interactively with hidden input (recommended).
    #[arg(long)]
    password: Option<String>,

    /// Save this Noroff API key to the config file
    #[arg(long)]
    api_key: Option<String>,

    /// Forget the stored session instead of logging in
    #[arg(long, conflicts_with_all = ["password", "api_key"])]
    logout: bool,

    /// Path to the config file
    #[arg(long, default_value = CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut app_config = AppConfig::load_or_default(&cli.config)?;
    let store = FileStore::new(&app_config.settings.storage_path);

    if cli.logout {
        Session::clear(&store).context("failed to clear session")?;
        println!("Logged out.");
        return Ok(());
    }

    // ── Step 1: Save API key ───────────────────────────────────────
    if let Some(key) = cli.api_key {
        app_config.api.api_key = Some(key);
        app_config.save(&cli.config)?;
        println!("Saved API key to {}", cli.config.display());
    }

    let email = cli.email.context("--email is required")?;

    // ── Step 2: Read password ──────────────────────────────────────
    let password = match cli.password {
        Some(p) => p,
        None => {
            let p = rpassword::prompt_password("Password: ").context("failed to read password")?;
            if p.is_empty() {
                bail!("password cannot be empty");
            }
            p
        }
    };

    // ── Step 3: Authenticate ───────────────────────────────────────
    println!("Logging in as {email}...");
    let client = AuctionClient::new(
        &app_config.api.base_url,
        app_config.api.api_key.as_deref(),
        None,
    )?;
    let login = client
        .login(&email, &password)
        .await
        .context("login failed, check your email and password")?;

    // ── Step 4: Store session ──────────────────────────────────────
    let user = Session::save(&store, &login).context("failed to store session")?;
    println!("Login successful! Welcome {}!", user.name);
    println!("Session saved to {}", store.path().display());
    println!();
    println!("Next steps:");
    println!("  cargo run --bin auction-watch -- watch <listing-id>");
    println!("  cargo run --bin auction-watch -- run");

    Ok(())
}
