use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::types::{ApiResponse, Listing, LoginData, LoginRequest};

/// Header carrying the Noroff API key.
const API_KEY_HEADER: &str = "x-noroff-api-key";

/// Whole-request timeout for every call the client makes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("invalid API base URL {0}")]
    BaseUrl(String),
    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
    #[error("response from {0} carried no data")]
    MissingData(&'static str),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Read access to listings, the one API call the notifier depends on.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch the current state of a listing. `Ok(None)` when the API answers
    /// without a `data` payload.
    async fn read_listing(&self, listing_id: &str) -> Result<Option<Listing>, ApiError>;
}

/// Client for the auction REST API.
#[derive(Debug, Clone)]
pub struct AuctionClient {
    http: reqwest::Client,
    base: Url,
    headers: HeaderMap,
}

impl AuctionClient {
    /// Build a client. `api_key` and `access_token` are attached to every
    /// request when present.
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        access_token: Option<&str>,
    ) -> Result<Self, ApiError> {
        let base = Url::parse(base_url).map_err(|e| ApiError::BaseUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::BaseUrl(base_url.to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            headers.insert(API_KEY_HEADER, HeaderValue::from_str(key)?);
        }
        if let Some(token) = access_token.filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base,
            headers,
        })
    }

    /// `{base}/{segments...}` with percent-encoded segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::BaseUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// URL for a single listing, including seller and bids.
    pub fn listing_url(&self, listing_id: &str) -> Result<Url, ApiError> {
        let mut url = self.endpoint(&["auction", "listings", listing_id])?;
        url.query_pairs_mut()
            .append_pair("_seller", "true")
            .append_pair("_bids", "true");
        Ok(url)
    }

    pub async fn fetch_listing(&self, listing_id: &str) -> Result<Option<Listing>, ApiError> {
        let url = self.listing_url(listing_id)?;
        let res = self
            .http
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await?;
        let body: ApiResponse<Listing> = check_status(res).await?.json().await?;
        debug!(
            "Fetched listing {listing_id} ({} bid(s))",
            body.data.as_ref().map(|l| l.bids.len()).unwrap_or(0)
        );
        Ok(body.data)
    }

    /// Exchange credentials for an access token.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginData, ApiError> {
        let url = self.endpoint(&["auth", "login"])?;
        let res = self
            .http
            .post(url)
            .headers(self.headers.clone())
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        let body: ApiResponse<LoginData> = check_status(res).await?.json().await?;
        body.data.ok_or(ApiError::MissingData("auth/login"))
    }
}

#[async_trait]
impl ListingSource for AuctionClient {
    async fn read_listing(&self, listing_id: &str) -> Result<Option<Listing>, ApiError> {
        self.fetch_listing(listing_id).await
    }
}

/// Turn a non-2xx response into [`ApiError::Status`] carrying the server's
/// message.
async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let text = res.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|body| error_message(&body))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("An error occurred")
                .to_string()
        });
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

/// First message of a Noroff error body: `{"errors":[{"message":..}]}` or
/// `{"message":..}`.
fn error_message(body: &Value) -> Option<String> {
    body.get("errors")
        .and_then(|errors| errors.get(0))
        .and_then(|first| first.get("message"))
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}
