use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunker::CodeChunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Partial,
    Inferred,
    Synthetic,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Partial => "partial",
            MatchType::Inferred => "inferred",
            MatchType::Synthetic => "synthetic",
        }
    }
}

/// Where a candidate came from. Never changed by verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultOrigin {
    /// Read from disk and ranked.
    Retrieved,
    /// Named in the request text but not read.
    Proposed,
    /// Claimed by a model answer.
    Synthetic,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub file_exists: bool,
    pub content_matches: bool,
    pub entities_verified: bool,
    pub last_modified: Option<DateTime<Utc>>,
    pub discrepancies: Vec<String>,
}

/// One file-level candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub file_path: String,
    /// Content as seen when the candidate was built.
    pub content: String,
    pub chunks: Vec<CodeChunk>,
    /// Unbounded heuristic score from the ranker.
    pub relevance_score: f64,
    /// Ranker-assigned starting point for confidence, in `[0.5, 0.75]`.
    pub prior_confidence: f64,
    pub confidence_score: f64,
    pub match_type: MatchType,
    pub origin: ResultOrigin,
    pub verification: Verification,
}

impl SearchResult {
    pub fn new(file_path: impl Into<String>, content: impl Into<String>, origin: ResultOrigin) -> Self {
        Self {
            file_path: file_path.into(),
            content: content.into(),
            chunks: Vec::new(),
            relevance_score: 0.0,
            prior_confidence: 0.5,
            confidence_score: 0.5,
            match_type: MatchType::Partial,
            origin,
            verification: Verification::default(),
        }
    }
}
