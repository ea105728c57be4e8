//! Lost Ark Open API listings search.
//!
//! API docs: https://developer-lostark.game.onstove.com
//! Endpoints: `POST /auctions/items` (auction house), `POST /markets/items`
//! (fixed-price market). Both take the same PascalCase search body.
//! Auth: `authorization: bearer {key}` on every request.
//! Rate limit: 100 requests/minute per key; 429 when exceeded.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::ListingSource;
use crate::types::{FetchError, FetchOutcome, RawListing, SearchQuery};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const SOURCE_NAME: &str = "lostark";

/// Longest slice of an error body kept in `FetchError` details.
const MAX_ERROR_BODY: usize = 512;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// Search response envelope. Paging fields are ignored; `Items` may be
/// missing or `null` when nothing matched.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SearchResponse {
    #[serde(default)]
    items: Option<Vec<RawListing>>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Lost Ark Open API client.
pub struct LostArkClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
    timeout: Duration,
}

impl LostArkClient {
    /// Build a client. `timeout` bounds each whole request.
    pub fn new(base_url: impl Into<String>, api_key: SecretString, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("deal_scout/0.1.0")
            .build()
            .context("Failed to build HTTP client for Lost Ark API")?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        })
    }

    fn endpoint(&self, query: &SearchQuery) -> String {
        format!("{}{}", self.base_url, query.mode.path())
    }

    fn network_error(&self, err: reqwest::Error) -> FetchError {
        let detail = if err.is_timeout() {
            format!("request timed out after {}ms", self.timeout.as_millis())
        } else {
            err.to_string()
        };
        FetchError::Network { detail }
    }

    /// Map a non-2xx response to the error taxonomy.
    fn classify_status(status: StatusCode, retry_after: Option<String>, body: &str) -> FetchError {
        let body = truncate(body);
        match status {
            StatusCode::UNAUTHORIZED => FetchError::Unauthorized {
                detail: format!("HTTP 401: {body}"),
            },
            StatusCode::TOO_MANY_REQUESTS => FetchError::RateLimited {
                detail: match retry_after {
                    Some(secs) => format!("HTTP 429, retry after {secs}s: {body}"),
                    None => format!("HTTP 429: {body}"),
                },
            },
            other => FetchError::Upstream {
                status: Some(other.as_u16()),
                detail: body,
            },
        }
    }

    /// Decode a 2xx body. `null`, `{}`, a null `Items` and an empty `Items`
    /// all mean nothing matched.
    fn parse_body(status: StatusCode, bytes: &[u8]) -> Result<FetchOutcome, FetchError> {
        let parsed: Option<SearchResponse> =
            serde_json::from_slice(bytes).map_err(|e| FetchError::Upstream {
                status: Some(status.as_u16()),
                detail: format!("malformed response body: {e}"),
            })?;

        match parsed.and_then(|r| r.items) {
            Some(items) if !items.is_empty() => Ok(FetchOutcome::Listings(items)),
            _ => Ok(FetchOutcome::Empty),
        }
    }
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

#[async_trait]
impl ListingSource for LostArkClient {
    async fn fetch_listings(&self, query: &SearchQuery) -> Result<FetchOutcome, FetchError> {
        let url = self.endpoint(query);
        debug!(url = %url, mode = %query.mode, "Searching Lost Ark listings");

        let resp = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("bearer {}", self.api_key.expose_secret()))
            .header(ACCEPT, "application/json")
            .json(query)
            .send()
            .await
            .map_err(|e| self.network_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, retry_after, &body));
        }

        let bytes = resp.bytes().await.map_err(|e| self.network_error(e))?;
        let outcome = Self::parse_body(status, &bytes)?;

        match &outcome {
            FetchOutcome::Listings(items) => info!(count = items.len(), "Lost Ark listings received"),
            FetchOutcome::Empty => info!("Lost Ark search matched no listings"),
        }
        Ok(outcome)
    }

    fn name(&self) -> &str {
        SOURCE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
