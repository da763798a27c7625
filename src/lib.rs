pub mod api;
pub mod config;
pub mod engine;
pub mod notifier;
pub mod reporter;
pub mod session;
pub mod state;
pub mod storage;
pub mod types;

/// Noroff API base URL (auction endpoints live under `/auction`)
pub const API_BASE: &str = "https://v2.api.noroff.dev";

/// Store key of the persisted watch registry. Only the notifier writes it.
pub const WATCH_KEY: &str = "watchedListings:v1";
