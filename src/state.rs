use std::collections::HashMap;

use tracing::{debug, warn};

use crate::WATCH_KEY;
use crate::storage::{KeyValueStore, StoreError};
use crate::types::{ListingSnapshot, WatchedListing};

/// Listings the current user is watching, keyed by listing id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatchRegistry {
    pub entries: HashMap<String, WatchedListing>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the persisted registry.
    ///
    /// A missing key yields an empty registry. Unreadable or corrupt data is
    /// logged and also yields an empty registry.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let raw = match store.get(WATCH_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Self::new(),
            Err(e) => {
                warn!("Failed to read watch registry: {e}");
                return Self::new();
            }
        };
        match serde_json::from_str::<HashMap<String, WatchedListing>>(&raw) {
            Ok(entries) => {
                debug!("Loaded {} watched listing(s)", entries.len());
                Self { entries }
            }
            Err(e) => {
                warn!("Discarding unreadable watch registry: {e}");
                Self::new()
            }
        }
    }

    /// The registry as stored under [`WATCH_KEY`].
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.entries)
    }

    /// Write the whole registry under [`WATCH_KEY`].
    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), StoreError> {
        store.set(WATCH_KEY, &self.to_json()?)
    }

    /// Insert or overwrite the entry for `listing_id`.
    pub fn watch(&mut self, listing_id: &str, snapshot: ListingSnapshot) {
        self.entries
            .insert(listing_id.to_string(), WatchedListing::from(snapshot));
    }

    pub fn unwatch(&mut self, listing_id: &str) -> Option<WatchedListing> {
        self.entries.remove(listing_id)
    }

    /// Replace an existing entry after a poll. Returns `false` (and changes
    /// nothing) when the listing was unwatched in the meantime.
    pub fn update(&mut self, listing_id: &str, next: WatchedListing) -> bool {
        match self.entries.get_mut(listing_id) {
            Some(entry) => {
                *entry = next;
                true
            }
            None => false,
        }
    }

    /// Fold entries loaded from storage into this registry. On a shared id
    /// the in-memory entry is kept.
    pub fn merge(&mut self, other: WatchRegistry) {
        for (id, entry) in other.entries {
            self.entries.entry(id).or_insert(entry);
        }
    }

    pub fn get(&self, listing_id: &str) -> Option<&WatchedListing> {
        self.entries.get(listing_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
