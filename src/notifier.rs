//! Watch notifier: polls watched listings and raises outbid / won /
//! ending-soon alerts.
//!
//! The notifier owns the registry and the poll task. Polling runs on a
//! tokio interval that can be suspended (`Visibility::Hidden`) and resumed
//! with an immediate catch-up poll (`Visibility::Visible`).
//!
//! Registry snapshots are serialized under the registry lock and written
//! outside it. Each snapshot carries a generation number and the store only
//! ever moves forward, so a slow write can never replace newer data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::{debug, info, warn};

use crate::WATCH_KEY;
use crate::api::{ApiError, ListingSource};
use crate::engine::{ENDING_SOON_MINS, evaluate};
use crate::reporter::AlertSink;
use crate::state::WatchRegistry;
use crate::storage::KeyValueStore;
use crate::types::{Alert, Listing, ListingSnapshot, WatchedListing};

/// Default poll cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound on a single listing read within a poll cycle.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Whether the consumer is currently showing the notifier's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Counters for one completed poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub checked: usize,
    /// Includes reads that hit [`FETCH_TIMEOUT`].
    pub failed: usize,
    /// Listings answered without data.
    pub empty: usize,
    pub alerts: usize,
}

pub struct Notifier {
    shared: Arc<Shared>,
    poller: Mutex<Option<Poller>>,
}

struct Shared {
    source: Arc<dyn ListingSource>,
    alerts: Arc<dyn AlertSink>,
    store: Arc<dyn KeyValueStore>,
    user: RwLock<Option<String>>,
    registry: Mutex<WatchRegistry>,
    polling: AtomicBool,
    ending_soon: TimeDelta,
    fetch_timeout: Duration,
    /// Last generation handed out; advanced under the registry lock.
    generation: AtomicU64,
    /// Last generation handed to the store.
    written: Mutex<u64>,
}

struct Poller {
    visibility: watch::Sender<Visibility>,
    task: JoinHandle<()>,
}

/// Serialized registry, tagged with its place in mutation order.
struct PendingWrite {
    generation: u64,
    json: String,
}

impl Notifier {
    pub fn new(
        source: Arc<dyn ListingSource>,
        alerts: Arc<dyn AlertSink>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self::with_window(source, alerts, store, TimeDelta::minutes(ENDING_SOON_MINS))
    }

    /// Like [`Notifier::new`] with a custom ending-soon window.
    pub fn with_window(
        source: Arc<dyn ListingSource>,
        alerts: Arc<dyn AlertSink>,
        store: Arc<dyn KeyValueStore>,
        ending_soon: TimeDelta,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                source,
                alerts,
                store,
                user: RwLock::new(None),
                registry: Mutex::new(WatchRegistry::new()),
                polling: AtomicBool::new(false),
                ending_soon,
                fetch_timeout: FETCH_TIMEOUT,
                generation: AtomicU64::new(0),
                written: Mutex::new(0),
            }),
            poller: Mutex::new(None),
        }
    }

    /// Set the tracked user, load the persisted registry and (re)start the
    /// poll timer. Must be called from within a tokio runtime.
    pub fn initialize(&self, user: Option<String>, poll_interval: Duration) {
        self.set_user(user);
        self.load_registry();

        let (tx, rx) = watch::channel(Visibility::Visible);
        let task = tokio::spawn(run_poller(self.shared.clone(), poll_interval, rx));
        let previous = self.lock_poller().replace(Poller {
            visibility: tx,
            task,
        });
        if let Some(old) = previous {
            debug!("Replacing running poll timer");
            old.task.abort();
        }
        info!(
            "Notifier started: {} watched listing(s), interval {}s",
            self.shared.lock_registry().len(),
            poll_interval.as_secs()
        );
    }

    pub fn set_user(&self, user: Option<String>) {
        let user = user.filter(|u| !u.is_empty());
        *self.shared.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }

    pub fn user(&self) -> Option<String> {
        self.shared.current_user()
    }

    /// Merge the persisted registry into memory. Entries already in memory
    /// are kept, since they may hold changes a failed save never stored.
    pub fn load_registry(&self) {
        let loaded = WatchRegistry::load(self.shared.store.as_ref());
        self.shared.lock_registry().merge(loaded);
    }

    /// Start (or refresh) watching a listing from data the caller already
    /// holds.
    pub fn watch(&self, listing_id: &str, snapshot: ListingSnapshot) {
        let pending = {
            let mut registry = self.shared.lock_registry();
            registry.watch(listing_id, snapshot);
            self.shared.snapshot(&registry)
        };
        self.shared.write(pending);
        debug!("Watching listing {listing_id}");
    }

    pub fn unwatch(&self, listing_id: &str) {
        let pending = {
            let mut registry = self.shared.lock_registry();
            if registry.unwatch(listing_id).is_some() {
                debug!("Stopped watching listing {listing_id}");
            }
            self.shared.snapshot(&registry)
        };
        self.shared.write(pending);
    }

    pub fn entry(&self, listing_id: &str) -> Option<WatchedListing> {
        self.shared.lock_registry().get(listing_id).cloned()
    }

    pub fn entries(&self) -> HashMap<String, WatchedListing> {
        self.shared.lock_registry().entries.clone()
    }

    /// Suspend (hidden) or resume (visible) the poll timer. Resuming polls
    /// immediately. No-op before [`Notifier::initialize`].
    pub fn set_visibility(&self, visibility: Visibility) {
        if let Some(poller) = self.lock_poller().as_ref() {
            poller.visibility.send_if_modified(|current| {
                if *current == visibility {
                    false
                } else {
                    *current = visibility;
                    true
                }
            });
        }
    }

    /// Run one poll cycle now. Returns `None` if another cycle is still in
    /// flight.
    pub async fn poll_all(&self) -> Option<PollSummary> {
        self.shared.poll_all_at(Utc::now()).await
    }

    /// [`Notifier::poll_all`] against an explicit clock reading.
    pub async fn poll_all_at(&self, now: DateTime<Utc>) -> Option<PollSummary> {
        self.shared.poll_all_at(now).await
    }

    /// Stop the poll timer, cancelling a timer-driven cycle in progress.
    /// Watches stay persisted.
    pub fn shutdown(&self) {
        if let Some(poller) = self.lock_poller().take() {
            poller.task.abort();
            info!("Notifier stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_poller()
            .as_ref()
            .is_some_and(|p| !p.task.is_finished())
    }

    fn lock_poller(&self) -> MutexGuard<'_, Option<Poller>> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        if let Some(poller) = self.lock_poller().take() {
            poller.task.abort();
        }
    }
}

/// Clears the in-flight flag when a poll cycle ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Shared {
    fn lock_registry(&self) -> MutexGuard<'_, WatchRegistry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_user(&self) -> Option<String> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Serialize the registry. Call with the registry lock held so that
    /// generations follow mutation order.
    fn snapshot(&self, registry: &WatchRegistry) -> Option<PendingWrite> {
        match registry.to_json() {
            Ok(json) => Some(PendingWrite {
                generation: self.generation.fetch_add(1, Ordering::AcqRel) + 1,
                json,
            }),
            Err(e) => {
                warn!("Failed to encode watch registry: {e}");
                None
            }
        }
    }

    /// Best-effort save; the in-memory registry stays authoritative.
    /// Writes older than one already stored are dropped.
    fn write(&self, pending: Option<PendingWrite>) {
        let Some(pending) = pending else {
            return;
        };
        let mut written = self.written.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.generation <= *written {
            debug!("Skipping stale registry write {}", pending.generation);
            return;
        }
        *written = pending.generation;
        if let Err(e) = self.store.set(WATCH_KEY, &pending.json) {
            warn!("Failed to persist watch registry: {e}");
        }
    }

    /// [`Shared::write`] on the blocking pool, for use from poll cycles.
    async fn write_off_runtime(self: &Arc<Self>, pending: Option<PendingWrite>) {
        if pending.is_none() {
            return;
        }
        let shared = Arc::clone(self);
        if let Err(e) = tokio::task::spawn_blocking(move || shared.write(pending)).await {
            warn!("Registry write task failed: {e}");
        }
    }

    async fn read_bounded(&self, listing_id: &str) -> Result<Option<Listing>, ApiError> {
        match timeout(self.fetch_timeout, self.source.read_listing(listing_id)).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout(self.fetch_timeout)),
        }
    }

    /// Fetch every watched listing concurrently and apply each result as
    /// soon as it arrives.
    async fn poll_all_at(self: &Arc<Self>, now: DateTime<Utc>) -> Option<PollSummary> {
        if self
            .polling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Previous poll still running, skipping");
            return None;
        }
        let _in_flight = InFlight(&self.polling);

        let ids = self.lock_registry().ids();
        let mut summary = PollSummary::default();
        if ids.is_empty() {
            return Some(summary);
        }
        debug!("Polling {} watched listing(s)", ids.len());

        let user = self.current_user();
        let mut fetches: FuturesUnordered<_> = ids
            .into_iter()
            .map(|id| async move {
                let result = self.read_bounded(&id).await;
                (id, result)
            })
            .collect();

        while let Some((id, result)) = fetches.next().await {
            match result {
                Ok(Some(listing)) => {
                    summary.checked += 1;
                    let (alerts, pending) = self.apply(&id, &listing, user.as_deref(), now);
                    self.write_off_runtime(pending).await;
                    summary.alerts += alerts.len();
                    for alert in &alerts {
                        self.alerts.notify(alert);
                    }
                }
                Ok(None) => {
                    debug!("Listing {id} returned no data, skipping");
                    summary.empty += 1;
                }
                Err(e) => {
                    warn!("Failed to poll listing {id}: {e}");
                    summary.failed += 1;
                }
            }
        }

        debug!(
            "Poll complete: {} checked, {} failed, {} alert(s)",
            summary.checked, summary.failed, summary.alerts
        );
        Some(summary)
    }

    /// Compare and update one entry. Returns the alerts to raise and the
    /// registry snapshot to persist.
    fn apply(
        &self,
        listing_id: &str,
        listing: &Listing,
        user: Option<&str>,
        now: DateTime<Utc>,
    ) -> (Vec<Alert>, Option<PendingWrite>) {
        let mut registry = self.lock_registry();
        let Some(prev) = registry.get(listing_id) else {
            debug!("Listing {listing_id} was unwatched during poll");
            return (Vec::new(), None);
        };
        let eval = evaluate(prev, listing, user, now, self.ending_soon);
        debug!("Listing {listing_id}: {:?}", eval.state);
        registry.update(listing_id, eval.next);
        let pending = self.snapshot(&registry);
        drop(registry);

        let alerts = eval
            .events
            .into_iter()
            .map(|event| Alert::new(event, listing_id, Some(listing.title.as_str())))
            .collect();
        (alerts, pending)
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Timer loop. Polls run inline, so aborting this task also cancels a cycle
/// in progress, and ticks that fall due during a cycle are skipped.
async fn run_poller(
    shared: Arc<Shared>,
    period: Duration,
    mut visibility: watch::Receiver<Visibility>,
) {
    let mut timer = ticker(period);
    loop {
        let hidden = *visibility.borrow_and_update() == Visibility::Hidden;
        if hidden {
            debug!("Hidden, polling suspended");
            loop {
                if visibility.changed().await.is_err() {
                    return;
                }
                if *visibility.borrow_and_update() == Visibility::Visible {
                    break;
                }
            }
            debug!("Visible again, catching up");
            timer = ticker(period);
            shared.poll_all_at(Utc::now()).await;
            continue;
        }

        tokio::select! {
            _ = timer.tick() => {
                shared.poll_all_at(Utc::now()).await;
            }
            changed = visibility.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}
