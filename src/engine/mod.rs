//! Core engine — the fetch → normalize → analyze cycle and its scheduler.

pub mod analysis;
pub mod cycle;
pub mod normalizer;
pub mod scheduler;
pub mod zscore;

use std::sync::Arc;

use crate::config::{AnalysisConfig, AnalysisEngine};
use analysis::{Analyzer, ProcessAnalyzer};
use zscore::ZScoreAnalyzer;

/// Build the analyzer selected by `analysis.engine`.
pub fn build_analyzer(cfg: &AnalysisConfig) -> Arc<dyn Analyzer> {
    match cfg.engine {
        AnalysisEngine::Process => Arc::new(ProcessAnalyzer::from_config(cfg)),
        AnalysisEngine::Builtin => Arc::new(ZScoreAnalyzer::from_config(cfg)),
    }
}
