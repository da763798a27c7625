use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;

use crate::types::{Listing, ListingSnapshot, WatchEvent, WatchedListing};

/// Default width of the "ending soon" window in minutes.
pub const ENDING_SOON_MINS: i64 = 60;

/// Where a watched auction stands for the current user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingState {
    Leading,
    NotLeading,
    EndedWon,
    EndedLost,
}

impl ListingState {
    pub fn infer(snapshot: &ListingSnapshot, user: Option<&str>, now: DateTime<Utc>) -> Self {
        let leading = is_user(snapshot.highest_bidder_name.as_deref(), user)
            && snapshot.highest > Decimal::ZERO;
        let ended = snapshot.ends_at.is_some_and(|end| end <= now);
        match (ended, leading) {
            (true, true) => ListingState::EndedWon,
            (true, false) => ListingState::EndedLost,
            (false, true) => ListingState::Leading,
            (false, false) => ListingState::NotLeading,
        }
    }
}

/// Outcome of comparing a watch entry against a freshly read listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub state: ListingState,
    pub events: Vec<WatchEvent>,
    /// Entry to store for the next poll.
    pub next: WatchedListing,
}

/// Detect outbid / won / ending-soon transitions for one listing.
///
/// `prev` is the entry as of the last poll, `listing` the current server
/// state. `window` is the ending-soon threshold.
pub fn evaluate(
    prev: &WatchedListing,
    listing: &Listing,
    user: Option<&str>,
    now: DateTime<Utc>,
    window: TimeDelta,
) -> Evaluation {
    let current = ListingSnapshot::from_listing(listing);
    let state = ListingState::infer(&current, user, now);
    let mut events = Vec::new();

    // Outbid looks only at leadership and price, not at the clock, so a
    // last-second bid on an auction that closed between polls still counts.
    let was_leading = is_user(prev.last_highest_bidder_name.as_deref(), user);
    let other_leads = current
        .highest_bidder_name
        .as_deref()
        .is_some_and(|name| !is_user(Some(name), user));
    if was_leading && other_leads && current.highest > prev.last_highest_amount {
        events.push(WatchEvent::Outbid);
    }

    let won = state == ListingState::EndedWon && !prev.notified_won;
    if won {
        events.push(WatchEvent::Won);
    }

    let ends_soon = current
        .ends_at
        .is_some_and(|end| within_window(end - now, window));
    let was_soon = prev.ends_at.is_some_and(|end| end - now <= window);
    if ends_soon && !was_soon {
        events.push(WatchEvent::EndingSoon);
    }

    let next = WatchedListing {
        last_highest_amount: current.highest,
        last_highest_bidder_name: current.highest_bidder_name,
        ends_at: current.ends_at.or(prev.ends_at),
        notified_won: prev.notified_won || won,
    };

    Evaluation {
        state,
        events,
        next,
    }
}

fn within_window(remaining: TimeDelta, window: TimeDelta) -> bool {
    remaining > TimeDelta::zero() && remaining <= window
}

fn is_user(name: Option<&str>, user: Option<&str>) -> bool {
    matches!((name, user), (Some(n), Some(u)) if n == u)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    fn window() -> TimeDelta {
        TimeDelta::minutes(ENDING_SOON_MINS)
    }

    fn entry(amount: Decimal, bidder: Option<&str>, ends_at: Option<DateTime<Utc>>) -> WatchedListing {
        WatchedListing {
            last_highest_amount: amount,
            last_highest_bidder_name: bidder.map(str::to_string),
            ends_at,
            notified_won: false,
        }
    }

    fn listing(ends_at: DateTime<Utc>, bids: &[(u32, &str)]) -> Listing {
        let bids: Vec<_> = bids
            .iter()
            .map(|(amount, name)| json!({ "amount": amount, "bidder": { "name": name } }))
            .collect();
        serde_json::from_value(json!({
            "id": "L1",
            "title": "Test listing",
            "endsAt": ends_at.to_rfc3339(),
            "bids": bids,
        }))
        .expect("valid listing JSON")
    }

    fn far_future() -> DateTime<Utc> {
        now() + TimeDelta::days(3)
    }

    // ── outbid ─────────────────────────────────────────────────────

    #[test]
    fn outbid_fires_when_someone_else_takes_lead() {
        let prev = entry(dec!(100), Some("alice"), Some(far_future()));
        let l = listing(far_future(), &[(100, "alice"), (150, "bob")]);
        let eval = evaluate(&prev, &l, Some("alice"), now(), window());
        assert_eq!(eval.events, vec![WatchEvent::Outbid]);
        assert_eq!(eval.state, ListingState::NotLeading);
        assert_eq!(eval.next.last_highest_amount, dec!(150));
        assert_eq!(eval.next.last_highest_bidder_name.as_deref(), Some("bob"));
    }

    #[test]
    fn outbid_does_not_repeat_on_unchanged_poll() {
        let prev = entry(dec!(100), Some("alice"), Some(far_future()));
        let l = listing(far_future(), &[(100, "alice"), (150, "bob")]);
        let first = evaluate(&prev, &l, Some("alice"), now(), window());
        assert_eq!(first.events, vec![WatchEvent::Outbid]);

        let second = evaluate(&first.next, &l, Some("alice"), now(), window());
        assert!(second.events.is_empty());
    }

    #[test]
    fn no_outbid_without_price_increase() {
        // Stale read showing a different bidder at the same amount.
        let prev = entry(dec!(100), Some("alice"), Some(far_future()));
        let l = listing(far_future(), &[(100, "bob")]);
        let eval = evaluate(&prev, &l, Some("alice"), now(), window());
        assert!(eval.events.is_empty());
    }

    #[test]
    fn no_outbid_when_user_was_not_leading() {
        let prev = entry(dec!(0), None, Some(far_future()));
        let l = listing(far_future(), &[(50, "carol")]);
        let eval = evaluate(&prev, &l, Some("dave"), now(), window());
        assert!(eval.events.is_empty());
    }

    #[test]
    fn no_outbid_without_user() {
        let prev = entry(dec!(10), Some("alice"), Some(far_future()));
        let l = listing(far_future(), &[(20, "bob")]);
        let eval = evaluate(&prev, &l, None, now(), window());
        assert!(eval.events.is_empty());
    }

    #[test]
    fn outbid_on_closing_snipe() {
        let ended = now() - TimeDelta::minutes(1);
        let prev = entry(dec!(100), Some("alice"), Some(ended));
        let l = listing(ended, &[(100, "alice"), (110, "bob")]);
        let eval = evaluate(&prev, &l, Some("alice"), now(), window());
        assert_eq!(eval.events, vec![WatchEvent::Outbid]);
        assert_eq!(eval.state, ListingState::EndedLost);
    }

    // ── won ────────────────────────────────────────────────────────

    #[test]
    fn win_fires_for_leader_after_close() {
        let ended = now() - TimeDelta::hours(1);
        let prev = entry(dec!(200), Some("alice"), Some(ended));
        let l = listing(ended, &[(150, "bob"), (200, "alice")]);
        let eval = evaluate(&prev, &l, Some("alice"), now(), window());
        assert_eq!(eval.events, vec![WatchEvent::Won]);
        assert_eq!(eval.state, ListingState::EndedWon);
        assert!(eval.next.notified_won);
    }

    #[test]
    fn win_fires_at_exact_end_time() {
        let prev = entry(dec!(200), Some("alice"), Some(now()));
        let l = listing(now(), &[(200, "alice")]);
        let eval = evaluate(&prev, &l, Some("alice"), now(), window());
        assert_eq!(eval.events, vec![WatchEvent::Won]);
    }

    #[test]
    fn no_win_for_non_leader() {
        let ended = now() - TimeDelta::hours(1);
        let prev = entry(dec!(200), Some("bob"), Some(ended));
        let l = listing(ended, &[(200, "bob")]);
        let eval = evaluate(&prev, &l, Some("alice"), now(), window());
        assert!(eval.events.is_empty());
        assert_eq!(eval.state, ListingState::EndedLost);
    }

    #[test]
    fn no_win_without_bids() {
        let ended = now() - TimeDelta::hours(1);
        let prev = entry(dec!(0), None, Some(ended));
        let l = listing(ended, &[]);
        let eval = evaluate(&prev, &l, Some("alice"), now(), window());
        assert!(eval.events.is_empty());
    }

    #[test]
    fn win_reported_once() {
        let ended = now() - TimeDelta::hours(1);
        let prev = entry(dec!(200), Some("alice"), Some(ended));
        let l = listing(ended, &[(200, "alice")]);
        let first = evaluate(&prev, &l, Some("alice"), now(), window());
        let second = evaluate(&first.next, &l, Some("alice"), now(), window());
        assert_eq!(first.events, vec![WatchEvent::Won]);
        assert!(second.events.is_empty());
        assert!(second.next.notified_won);
    }

    #[test]
    fn no_win_before_close() {
        let prev = entry(dec!(200), Some("alice"), Some(far_future()));
        let l = listing(far_future(), &[(200, "alice")]);
        let eval = evaluate(&prev, &l, Some("alice"), now(), window());
        assert!(eval.events.is_empty());
        assert_eq!(eval.state, ListingState::Leading);
    }

    // ── ending soon ────────────────────────────────────────────────

    #[test]
    fn ending_soon_fires_on_crossing_threshold() {
        let end = now() + TimeDelta::minutes(50);
        // Previous poll recorded an end time more than an hour out.
        let prev = entry(dec!(0), None, Some(now() + TimeDelta::minutes(90)));
        let l = listing(end, &[]);
        let first = evaluate(&prev, &l, Some("alice"), now(), window());
        assert_eq!(first.events, vec![WatchEvent::EndingSoon]);

        let later = now() + TimeDelta::minutes(5);
        let second = evaluate(&first.next, &l, Some("alice"), later, window());
        assert!(second.events.is_empty());
    }

    #[test]
    fn ending_soon_fires_for_fresh_entry_without_end() {
        let prev = entry(dec!(0), None, None);
        let l = listing(now() + TimeDelta::minutes(10), &[]);
        let eval = evaluate(&prev, &l, None, now(), window());
        assert_eq!(eval.events, vec![WatchEvent::EndingSoon]);
    }

    #[test]
    fn not_ending_soon_when_far_away() {
        let prev = entry(dec!(0), None, Some(far_future()));
        let l = listing(far_future(), &[]);
        let eval = evaluate(&prev, &l, None, now(), window());
        assert!(eval.events.is_empty());
    }

    #[test]
    fn not_ending_soon_after_close() {
        let ended = now() - TimeDelta::minutes(1);
        let prev = entry(dec!(0), None, Some(now() + TimeDelta::hours(2)));
        let l = listing(ended, &[]);
        let eval = evaluate(&prev, &l, None, now(), window());
        assert!(eval.events.is_empty());
    }

    #[test]
    fn missing_end_time_never_ends() {
        let prev = entry(dec!(200), Some("alice"), None);
        let l: Listing = serde_json::from_value(json!({
            "id": "L1",
            "bids": [{ "amount": 200, "bidderName": "alice" }],
        }))
        .unwrap();
        let eval = evaluate(&prev, &l, Some("alice"), now(), window());
        assert!(eval.events.is_empty());
        assert_eq!(eval.state, ListingState::Leading);
        assert!(eval.next.ends_at.is_none());
    }

    #[test]
    fn missing_end_time_keeps_previous() {
        let prev = entry(dec!(0), None, Some(far_future()));
        let l: Listing = serde_json::from_value(json!({ "id": "L1" })).unwrap();
        let eval = evaluate(&prev, &l, None, now(), window());
        assert_eq!(eval.next.ends_at, Some(far_future()));
    }

    #[test]
    fn outbid_and_ending_soon_together() {
        let end = now() + TimeDelta::minutes(30);
        let prev = entry(dec!(100), Some("alice"), Some(now() + TimeDelta::hours(2)));
        let l = listing(end, &[(100, "alice"), (120, "bob")]);
        let eval = evaluate(&prev, &l, Some("alice"), now(), window());
        assert_eq!(eval.events, vec![WatchEvent::Outbid, WatchEvent::EndingSoon]);
    }
}
