//! Core domain types shared across all deal_scout modules.
//!
//! Search queries, the raw/normalized listing shapes, the analysis
//! request/response units, per-cycle state and the error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Search query
// ---------------------------------------------------------------------------

/// Which marketplace search produced a listing set.
///
/// The two modes hit different endpoints and return differently shaped
/// records (`AuctionInfo` vs `CurrentMinPrice`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Auction,
    Market,
}

impl SearchMode {
    /// Endpoint path relative to the API base URL.
    pub fn path(&self) -> &'static str {
        match self {
            SearchMode::Auction => "/auctions/items",
            SearchMode::Market => "/markets/items",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Auction => write!(f, "auction"),
            SearchMode::Market => write!(f, "market"),
        }
    }
}

/// Parameters of one marketplace search.
///
/// Read from config in snake_case, sent to the API in PascalCase.
/// Values are passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "PascalCase"))]
pub struct SearchQuery {
    #[serde(skip_serializing, default)]
    pub mode: SearchMode,
    pub sort: String,
    pub category_code: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub item_tier: Option<u32>,
    pub item_grade: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub item_name: Option<String>,
    #[serde(default)]
    pub page_no: u32,
    pub sort_condition: String,
}

impl Default for SearchQuery {
    /// Legendary engraving recipes named "원한", cheapest buy-now first.
    fn default() -> Self {
        Self {
            mode: SearchMode::Auction,
            sort: "BUY_PRICE".into(),
            category_code: 40000,
            item_tier: Some(3),
            item_grade: "전설".into(),
            item_name: Some("원한".into()),
            page_no: 0,
            sort_condition: "ASC".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw listings (marketplace JSON → Rust)
// ---------------------------------------------------------------------------

/// Price block attached to auction-house records.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuctionInfo {
    /// Buy-now price. `null` or 0 when the seller only takes bids.
    #[serde(default)]
    pub buy_price: Option<u64>,
    #[serde(default)]
    pub start_price: Option<u64>,
}

/// Record returned by the auction-house search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AuctionListing {
    pub name: String,
    #[serde(default)]
    pub grade: String,
    pub auction_info: AuctionInfo,
}

/// Record returned by the market (fixed-price exchange) search.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MarketListing {
    pub name: String,
    #[serde(default)]
    pub grade: String,
    /// Required key, nullable value.
    #[serde(deserialize_with = "nullable")]
    pub current_min_price: Option<u64>,
}

fn nullable<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<u64>::deserialize(deserializer)
}

/// One listing as the marketplace sent it.
///
/// Variants are tried in order; anything matching neither known shape is
/// kept as `Unrecognized` so the normalizer can drop it individually.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawListing {
    Auction(AuctionListing),
    Market(MarketListing),
    Unrecognized(serde_json::Value),
}

impl RawListing {
    pub fn name(&self) -> Option<&str> {
        match self {
            RawListing::Auction(a) => Some(&a.name),
            RawListing::Market(m) => Some(&m.name),
            RawListing::Unrecognized(v) => v.get("Name").and_then(|n| n.as_str()),
        }
    }
}

/// Feeds a normalized listing back through the normalizer as a market record.
impl From<&NormalizedListing> for RawListing {
    fn from(listing: &NormalizedListing) -> Self {
        RawListing::Market(MarketListing {
            name: listing.name.clone(),
            grade: listing.grade.clone(),
            current_min_price: Some(listing.price),
        })
    }
}

/// Result of a successful marketplace call.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Listings(Vec<RawListing>),
    /// The search matched nothing. Not an error.
    Empty,
}

// ---------------------------------------------------------------------------
// Normalized listings and analysis units
// ---------------------------------------------------------------------------

/// Uniform `{name, price, grade}` listing handed to the analysis stage.
///
/// `price` is always resolved and positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedListing {
    pub name: String,
    pub price: u64,
    pub grade: String,
}

/// All normalized listings of one cycle, in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisRequest(Vec<NormalizedListing>);

impl AnalysisRequest {
    pub fn new(listings: Vec<NormalizedListing>) -> Self {
        Self(listings)
    }

    pub fn listings(&self) -> &[NormalizedListing] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialize to the JSON array the analysis engine consumes.
    pub fn to_payload(&self) -> Result<String, AnalysisError> {
        serde_json::to_string(&self.0).map_err(|e| AnalysisError::Encode {
            detail: e.to_string(),
        })
    }
}

fn whole_gold<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let price = f64::deserialize(deserializer)?;
    if !price.is_finite() || price < 0.0 {
        return Err(serde::de::Error::custom(format!("invalid price {price}")));
    }
    Ok(price.round() as u64)
}

/// A listing flagged as underpriced by the analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub name: String,
    /// Accepts whole numbers written as floats (`1500.0`).
    #[serde(deserialize_with = "whole_gold")]
    pub price: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    pub z_score: f64,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} gold (z-score: {:.2})",
            self.name, self.price, self.z_score
        )
    }
}

// ---------------------------------------------------------------------------
// Cycle results and state
// ---------------------------------------------------------------------------

/// Which stage of a cycle produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleStage {
    Fetch,
    Analysis,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleStage::Fetch => write!(f, "fetch"),
            CycleStage::Analysis => write!(f, "analysis"),
        }
    }
}

/// What a completed fetch→normalize→analyze run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleSummary {
    /// The marketplace reported no matching listings.
    pub empty: bool,
    pub fetched: usize,
    pub normalized: usize,
    pub dropped: usize,
    pub recommendations: Vec<Recommendation>,
}

/// Outcome of the most recent cycle, as exposed to the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum CycleOutcome {
    Success {
        empty: bool,
        listings: usize,
        dropped: usize,
        deals: usize,
    },
    Failure {
        stage: CycleStage,
        kind: String,
        reason: String,
    },
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Success { .. })
    }
}

/// In-memory scheduler state. Never persisted; rebuilt on every start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleState {
    pub started_at: DateTime<Utc>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<CycleOutcome>,
    pub consecutive_failures: u32,
    pub cycles_run: u64,
    /// Deals from the last successful cycle. Kept across failed cycles.
    pub last_recommendations: Vec<Recommendation>,
}

impl CycleState {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            last_cycle_at: None,
            last_success_at: None,
            last_outcome: None,
            consecutive_failures: 0,
            cycles_run: 0,
            last_recommendations: Vec::new(),
        }
    }

    pub fn record_success(&mut self, summary: &CycleSummary, at: DateTime<Utc>) -> CycleOutcome {
        let outcome = CycleOutcome::Success {
            empty: summary.empty,
            listings: summary.normalized,
            dropped: summary.dropped,
            deals: summary.recommendations.len(),
        };
        self.cycles_run += 1;
        self.last_cycle_at = Some(at);
        self.last_success_at = Some(at);
        self.consecutive_failures = 0;
        self.last_recommendations = summary.recommendations.clone();
        self.last_outcome = Some(outcome.clone());
        outcome
    }

    pub fn record_failure(&mut self, error: &CycleError, at: DateTime<Utc>) -> CycleOutcome {
        let outcome = CycleOutcome::Failure {
            stage: error.stage(),
            kind: error.kind().to_string(),
            reason: error.to_string(),
        };
        self.cycles_run += 1;
        self.last_cycle_at = Some(at);
        self.consecutive_failures += 1;
        self.last_outcome = Some(outcome.clone());
        outcome
    }

    /// Coarse health label: "starting", "ok" or "degraded".
    pub fn health(&self) -> &'static str {
        match &self.last_outcome {
            None => "starting",
            Some(o) if o.is_success() => "ok",
            Some(_) => "degraded",
        }
    }
}

impl Default for CycleState {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Marketplace call failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// HTTP 401. The credential is wrong or expired; retrying won't help.
    #[error("unauthorized: {detail}")]
    Unauthorized { detail: String },

    #[error("rate limited: {detail}")]
    RateLimited { detail: String },

    #[error("upstream error (status {status:?}): {detail}")]
    Upstream { status: Option<u16>, detail: String },

    /// Transport failure, including request timeouts.
    #[error("network error: {detail}")]
    Network { detail: String },
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Unauthorized { .. } => "unauthorized",
            FetchError::RateLimited { .. } => "rate_limited",
            FetchError::Upstream { .. } => "upstream",
            FetchError::Network { .. } => "network",
        }
    }
}

/// Analysis stage failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    /// Non-zero exit. `code` is `None` when the process died from a signal.
    #[error("analysis process failed with exit code {code:?}")]
    ProcessFailed { code: Option<i32>, stderr: String },

    #[error("malformed analysis output: {detail}")]
    MalformedOutput { detail: String },

    #[error("analysis timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("failed to start analysis process '{program}': {detail}")]
    Spawn { program: String, detail: String },

    #[error("failed to encode analysis request: {detail}")]
    Encode { detail: String },
}

impl AnalysisError {
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::ProcessFailed { .. } => "process_failed",
            AnalysisError::MalformedOutput { .. } => "malformed_output",
            AnalysisError::Timeout { .. } => "timeout",
            AnalysisError::Spawn { .. } => "spawn",
            AnalysisError::Encode { .. } => "encode",
        }
    }
}

/// Non-fatal: the listing is dropped and counted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizationWarning {
    #[error("listing #{index} ('{name}') has no resolvable price")]
    NoPrice { index: usize, name: String },

    #[error("listing #{index} has an unrecognized shape")]
    UnrecognizedShape { index: usize },
}

/// A failed cycle, tagged with the stage that failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CycleError {
    #[error("fetch stage failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("analysis stage failed: {0}")]
    Analysis(#[from] AnalysisError),
}

impl CycleError {
    pub fn stage(&self) -> CycleStage {
        match self {
            CycleError::Fetch(_) => CycleStage::Fetch,
            CycleError::Analysis(_) => CycleStage::Analysis,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::Fetch(e) => e.kind(),
            CycleError::Analysis(e) => e.kind(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
