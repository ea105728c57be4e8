//! In-process z-score engine.
//!
//! Same contract as the external analysis process: a listing is a deal when
//! `(price - mean) / std_dev <= threshold` over the cycle's listings.
//! Uses the sample standard deviation. Small samples and flat prices
//! produce no deals.

use async_trait::async_trait;
use statrs::statistics::Statistics;

use super::analysis::Analyzer;
use crate::config::AnalysisConfig;
use crate::types::{AnalysisError, AnalysisRequest, NormalizedListing, Recommendation};

/// Deals sit at least 1.5 sigma below the mean (bottom ~6.7%).
pub const DEFAULT_THRESHOLD: f64 = -1.5;

/// Fewer listings than this and the statistics are meaningless.
pub const DEFAULT_MIN_SAMPLES: usize = 5;

#[derive(Debug, Clone)]
pub struct ZScoreAnalyzer {
    threshold: f64,
    min_samples: usize,
}

impl ZScoreAnalyzer {
    pub fn new(threshold: f64, min_samples: usize) -> Self {
        Self {
            threshold,
            // std_dev needs at least two points
            min_samples: min_samples.max(2),
        }
    }

    pub fn from_config(cfg: &AnalysisConfig) -> Self {
        Self::new(cfg.z_threshold, cfg.min_samples)
    }

    /// Score listings and keep those at or below the threshold, in input order.
    pub fn score(&self, listings: &[NormalizedListing]) -> Vec<Recommendation> {
        if listings.len() < self.min_samples {
            return Vec::new();
        }

        let prices: Vec<f64> = listings.iter().map(|l| l.price as f64).collect();
        let mean = prices.iter().mean();
        let std_dev = prices.iter().std_dev();
        if !std_dev.is_finite() || std_dev <= 0.0 {
            return Vec::new();
        }

        listings
            .iter()
            .zip(&prices)
            .filter_map(|(listing, &price)| {
                let z_score = (price - mean) / std_dev;
                (z_score <= self.threshold).then(|| Recommendation {
                    name: listing.name.clone(),
                    price: listing.price,
                    grade: Some(listing.grade.clone()),
                    z_score,
                })
            })
            .collect()
    }
}

impl Default for ZScoreAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_MIN_SAMPLES)
    }
}

#[async_trait]
impl Analyzer for ZScoreAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Vec<Recommendation>, AnalysisError> {
        Ok(self.score(request.listings()))
    }

    fn name(&self) -> &'static str {
        "builtin"
    }
}
