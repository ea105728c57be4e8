//! One fetch → normalize → analyze cycle.
//!
//! Every stage failure is returned as a `CycleError` tagged with its stage;
//! nothing escapes to the scheduler as a panic or an `anyhow` error.

use tracing::{error, info, warn};

use super::analysis::Analyzer;
use super::normalizer::normalize;
use crate::marketplace::ListingSource;
use crate::types::{AnalysisRequest, CycleError, CycleSummary, FetchError, FetchOutcome, SearchQuery};

/// Run a single cycle. No retries: the next tick is the retry.
pub async fn run_cycle(
    source: &dyn ListingSource,
    analyzer: &dyn Analyzer,
    query: &SearchQuery,
) -> Result<CycleSummary, CycleError> {
    // 1. Fetch
    let raw = match source.fetch_listings(query).await? {
        FetchOutcome::Listings(raw) => raw,
        FetchOutcome::Empty => {
            return Ok(CycleSummary {
                empty: true,
                ..CycleSummary::default()
            });
        }
    };

    // 2. Normalize
    let normalized = normalize(&raw);
    for warning in &normalized.warnings {
        warn!(warning = %warning, "Listing dropped");
    }
    info!(
        source = source.name(),
        fetched = raw.len(),
        normalized = normalized.listings.len(),
        dropped = normalized.dropped(),
        "Listings normalized"
    );

    let mut summary = CycleSummary {
        empty: false,
        fetched: raw.len(),
        normalized: normalized.listings.len(),
        dropped: normalized.dropped(),
        recommendations: Vec::new(),
    };
    if normalized.listings.is_empty() {
        info!("No priced listings; skipping analysis");
        return Ok(summary);
    }

    // 3. Analyze
    let request = AnalysisRequest::new(normalized.listings);
    summary.recommendations = analyzer.analyze(&request).await?;
    Ok(summary)
}

/// Log the human-readable result of a finished cycle.
pub fn log_cycle_result(cycle: u64, result: &Result<CycleSummary, CycleError>, consecutive_failures: u32) {
    match result {
        Ok(summary) if summary.empty => {
            info!(cycle, "No listings matched the search; no deals this cycle");
        }
        Ok(summary) if summary.recommendations.is_empty() => {
            info!(cycle, listings = summary.normalized, "No deals this cycle (all listings fairly priced)");
        }
        Ok(summary) => {
            info!(
                cycle,
                listings = summary.normalized,
                deals = summary.recommendations.len(),
                "Deals found"
            );
            for rec in &summary.recommendations {
                info!(cycle, "Deal: {rec}");
            }
        }
        Err(e) => {
            error!(
                cycle,
                stage = %e.stage(),
                kind = e.kind(),
                consecutive_failures,
                error = %e,
                "Cycle failed; will retry on next tick"
            );
            if let CycleError::Fetch(FetchError::Unauthorized { .. }) = e {
                error!("Marketplace rejected the API key: it is likely invalid or expired. Check the key in your environment / .env file.");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
