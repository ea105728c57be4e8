//! Mock listing source and recording analyzer for integration testing.
//!
//! Deterministic, in-memory stand-ins for the marketplace API and the
//! analysis engine. Both count calls so tests can assert on them.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deal_scout::engine::analysis::Analyzer;
use deal_scout::marketplace::ListingSource;
use deal_scout::types::*;

/// A scripted listing source.
///
/// Responses are served in order; once the script runs out the fallback
/// is repeated. Tracks total and concurrent calls.
pub struct MockSource {
    script: Mutex<VecDeque<Result<FetchOutcome, FetchError>>>,
    fallback: Result<FetchOutcome, FetchError>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockSource {
    pub fn new(fallback: Result<FetchOutcome, FetchError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Serve these responses first, in order.
    pub fn with_script(self, responses: Vec<Result<FetchOutcome, FetchError>>) -> Self {
        *self.script.lock().unwrap() = responses.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingSource for MockSource {
    async fn fetch_listings(&self, _query: &SearchQuery) -> Result<FetchOutcome, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let response = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Analyzer that records every request and returns a fixed result.
pub struct RecordingAnalyzer {
    requests: Arc<Mutex<Vec<AnalysisRequest>>>,
    result: Result<Vec<Recommendation>, AnalysisError>,
}

impl RecordingAnalyzer {
    pub fn new(result: Result<Vec<Recommendation>, AnalysisError>) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            result,
        }
    }

    pub fn invocations(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<AnalysisRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Analyzer for RecordingAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Vec<Recommendation>, AnalysisError> {
        self.requests.lock().unwrap().push(request.clone());
        self.result.clone()
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// -- Fixtures --

/// An auction-house record as the API sends it.
pub fn auction_listing(name: &str, grade: &str, buy: u64, start: u64) -> RawListing {
    serde_json::from_value(serde_json::json!({
        "Name": name,
        "Grade": grade,
        "AuctionInfo": {"BuyPrice": buy, "StartPrice": start}
    }))
    .unwrap()
}

pub fn deal(name: &str, price: u64, z_score: f64) -> Recommendation {
    Recommendation {
        name: name.to_string(),
        price,
        grade: None,
        z_score,
    }
}
