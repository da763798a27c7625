use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// Envelope the auction API wraps every payload in.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
}

/// An auction listing as returned by `GET /auction/listings/{id}`.
///
/// Only the fields the notifier reads are modelled; everything else in the
/// payload (media, seller, tags) is ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bids: Vec<Bid>,
}

/// A single bid on a listing.
///
/// The bidder's name arrives either flat (`bidderName`) or nested
/// (`bidder.name`) depending on the endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub amount: Decimal,
    #[serde(default)]
    pub bidder_name: Option<String>,
    #[serde(default)]
    pub bidder: Option<BidderRef>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BidderRef {
    pub name: String,
}

impl Bid {
    /// Bidder name, preferring the flat field. Empty names count as absent.
    pub fn bidder(&self) -> Option<&str> {
        self.bidder_name
            .as_deref()
            .or_else(|| self.bidder.as_ref().map(|b| b.name.as_str()))
            .filter(|name| !name.is_empty())
    }
}

impl Listing {
    /// The bid currently leading the auction.
    ///
    /// Ties on amount go to the earliest-placed bid. Bids without a `created`
    /// timestamp keep response order.
    pub fn leading_bid(&self) -> Option<&Bid> {
        let mut best: Option<&Bid> = None;
        for bid in &self.bids {
            best = match best {
                None => Some(bid),
                Some(cur) if bid.amount > cur.amount => Some(bid),
                Some(cur) if bid.amount == cur.amount => match (bid.created, cur.created) {
                    (Some(a), Some(b)) if a < b => Some(bid),
                    _ => Some(cur),
                },
                keep => keep,
            };
        }
        best
    }
}

/// Point-in-time view of a listing used to seed or refresh a watch entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListingSnapshot {
    pub highest: Decimal,
    pub highest_bidder_name: Option<String>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl ListingSnapshot {
    pub fn from_listing(listing: &Listing) -> Self {
        let leading = listing.leading_bid();
        Self {
            highest: leading.map(|b| b.amount).unwrap_or(Decimal::ZERO),
            highest_bidder_name: leading.and_then(Bid::bidder).map(str::to_string),
            ends_at: listing.ends_at,
        }
    }
}

/// One entry in the watch registry, persisted as camelCase JSON.
///
/// Aliases accept registries written by the browser client, which used
/// shorter field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchedListing {
    #[serde(default, alias = "lastHighest", with = "rust_decimal::serde::float")]
    pub last_highest_amount: Decimal,
    #[serde(
        default,
        alias = "lastHighestBidder",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_highest_bidder_name: Option<String>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    /// Set once a "won" alert has been raised for this entry.
    #[serde(default)]
    pub notified_won: bool,
}

impl From<ListingSnapshot> for WatchedListing {
    fn from(snapshot: ListingSnapshot) -> Self {
        Self {
            last_highest_amount: snapshot.highest,
            last_highest_bidder_name: snapshot.highest_bidder_name,
            ends_at: snapshot.ends_at,
            notified_won: false,
        }
    }
}

/// Visual style of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Success,
    Error,
}

/// Transition detected on a watched listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchEvent {
    Outbid,
    Won,
    EndingSoon,
}

impl WatchEvent {
    pub fn kind(self) -> AlertKind {
        match self {
            WatchEvent::Outbid => AlertKind::Error,
            WatchEvent::Won | WatchEvent::EndingSoon => AlertKind::Success,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            WatchEvent::Outbid => "You have been outbid on a watched listing.",
            WatchEvent::Won => "You won a watched auction!",
            WatchEvent::EndingSoon => "An auction you watch is ending within an hour!",
        }
    }
}

/// User-facing notification emitted by the notifier.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub timestamp: String,
    pub kind: AlertKind,
    pub event: WatchEvent,
    pub listing_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub message: String,
}

impl Alert {
    pub fn new(event: WatchEvent, listing_id: &str, title: Option<&str>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            kind: event.kind(),
            event,
            listing_id: listing_id.to_string(),
            title: title.filter(|t| !t.is_empty()).map(str::to_string),
            message: event.message().to_string(),
        }
    }
}

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Profile image reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub url: String,
    #[serde(default)]
    pub alt: String,
}

/// Successful login payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub name: String,
    pub email: String,
    pub access_token: String,
    #[serde(default)]
    pub avatar: Option<Media>,
    #[serde(default)]
    pub bio: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
