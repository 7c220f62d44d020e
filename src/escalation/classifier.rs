//! Heuristic judgement of fast-tier answers.
use serde::{Deserialize, Serialize};

use crate::config::EscalationConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub sufficient: bool,
    pub has_no_results: bool,
    pub lacks_structure: bool,
    /// Distinct uncertainty phrases found.
    pub uncertainty_phrases: usize,
    pub low_confidence: bool,
    /// Human-readable reasons the answer was judged insufficient.
    pub signals: Vec<String>,
}

pub trait ResponseQualityClassifier: Send + Sync {
    fn assess(&self, text: &str) -> QualityAssessment;
}

/// Phrase and structure matching over the answer prose.
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    config: EscalationConfig,
}

impl HeuristicClassifier {
    pub fn new(config: EscalationConfig) -> Self {
        Self { config }
    }
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self::new(EscalationConfig::default())
    }
}

impl ResponseQualityClassifier for HeuristicClassifier {
    fn assess(&self, text: &str) -> QualityAssessment {
        let lower = text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'");
        let cfg = &self.config;

        let has_no_results = cfg.no_results_phrases.iter().any(|p| lower.contains(p.as_str()));
        let has_markers = cfg.structure_markers.iter().any(|m| lower.contains(m.as_str()));
        let too_short = text.trim().chars().count() < cfg.min_response_chars;
        let lacks_structure = !has_markers || too_short;
        let uncertainty_phrases = cfg
            .uncertainty_phrases
            .iter()
            .filter(|p| lower.contains(p.as_str()))
            .count();
        let low_confidence = cfg.low_confidence_phrases.iter().any(|p| lower.contains(p.as_str()));

        let mut signals = Vec::new();
        if has_no_results {
            signals.push("response reports no results".to_string());
        }
        if !has_markers {
            signals.push("response has no path or analysis sections".to_string());
        }
        if too_short {
            signals.push(format!("response shorter than {} characters", cfg.min_response_chars));
        }
        if uncertainty_phrases >= cfg.uncertainty_threshold {
            signals.push(format!("{uncertainty_phrases} uncertainty phrases"));
        }
        if low_confidence {
            signals.push("response admits low confidence".to_string());
        }

        QualityAssessment {
            sufficient: signals.is_empty(),
            has_no_results,
            lacks_structure,
            uncertainty_phrases,
            low_confidence,
            signals,
        }
    }
}
