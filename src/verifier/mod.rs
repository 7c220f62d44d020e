//! Filesystem verification of search candidates.
//!
//! Every candidate is re-checked against the live file tree: the file must
//! exist, its content should match what was retrieved, and the entities its
//! chunks claim must still be declared there. Confidence is always derived
//! from the ranker's prior, so verifying a result twice yields the same fields.
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use crate::chunker::CodeChunk;
use crate::config::VerificationConfig;
use crate::fs::{Filesystem, is_confined};
use crate::models::{MatchType, ResultOrigin, SearchResult, Verification};

const EXISTS_BONUS: f64 = 0.1;
const CONTENT_MATCH_BONUS: f64 = 0.2;
const CONTENT_DRIFT_PENALTY: f64 = 0.3;
const ENTITY_MISSING_PENALTY: f64 = 0.4;
const MISSING_FILE_PENALTY: f64 = 0.7;
const SYNTHETIC_MISSING_SCORE: f64 = 0.01;
/// Missing files never score above this, whatever the configured drop floor.
const MISSING_FILE_CEILING: f64 = 0.05;
/// Existing files never score below this, keeping them strictly above missing ones.
const EXISTING_FLOOR: f64 = 0.1;

const HASH_BASE: u64 = 257;
const HASH_MODULUS: u64 = 1_000_000_007;

static DECLARATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(?:export\s+(?:default\s+)?)?(?:declare\s+)?(?:abstract\s+)?(?:async\s+)?(?:function\s*\*?|class|interface|type|enum|const|let|var)\s+([A-Za-z_$][\w$]*)",
    )
    .expect("declaration regex is valid")
});
static EXPORT_GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"export\s*(?:type\s+)?\{([^}]*)\}").expect("export group regex is valid"));
static DEFAULT_EXPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"export\s+default\s+([A-Za-z_$][\w$]*)").expect("default export regex is valid")
});

pub struct Verifier {
    fs: Arc<dyn Filesystem>,
    root: PathBuf,
    thresholds: VerificationConfig,
}

impl Verifier {
    pub fn new(fs: Arc<dyn Filesystem>, root: impl Into<PathBuf>, thresholds: VerificationConfig) -> Self {
        Self {
            fs,
            root: root.into(),
            thresholds,
        }
    }

    pub fn thresholds(&self) -> &VerificationConfig {
        &self.thresholds
    }

    /// Re-check one candidate against the filesystem.
    ///
    /// `origin`, `prior_confidence` and everything the ranker produced are
    /// carried over untouched; only `verification`, `confidence_score` and
    /// `match_type` are recomputed.
    pub fn verify(&self, result: &SearchResult) -> SearchResult {
        let mut verified = result.clone();
        let mut verification = Verification::default();

        let requested = self.absolute(&result.file_path);
        let resolved = if is_confined(Path::new(&result.file_path)) {
            self.fs.resolve(&requested)
        } else {
            verification
                .discrepancies
                .push(format!("outside the project root: {}", result.file_path));
            None
        };
        let Some(actual) = resolved else {
            if verification.discrepancies.is_empty() {
                verification.discrepancies.push(format!("file not found: {}", result.file_path));
            }
            let confidence = if result.origin == ResultOrigin::Synthetic {
                SYNTHETIC_MISSING_SCORE
            } else {
                let floor = self.thresholds.drop_floor.min(MISSING_FILE_CEILING);
                round_score(result.prior_confidence - MISSING_FILE_PENALTY)
                    .max(floor)
                    .min(MISSING_FILE_CEILING)
            };
            debug!(path = %result.file_path, confidence, "candidate file missing");
            verified.confidence_score = confidence;
            verified.match_type = self.classify(confidence);
            verified.verification = verification;
            return verified;
        };

        verification.file_exists = true;
        if actual != requested {
            verification
                .discrepancies
                .push(format!("resolved as {}", self.relative(&actual)));
        }
        verification.last_modified = self.fs.modified(&actual);

        let live = match self.fs.read_to_string(&actual) {
            Ok(text) => Some(text),
            Err(e) => {
                verification
                    .discrepancies
                    .push(format!("could not read file: {e}"));
                None
            }
        };

        let mut score = result.prior_confidence + EXISTS_BONUS;

        let live_text = live.as_deref().unwrap_or_default();
        verification.content_matches = live.is_some() && content_hash(&result.content) == content_hash(live_text);
        if verification.content_matches {
            score += CONTENT_MATCH_BONUS;
        } else {
            score -= CONTENT_DRIFT_PENALTY;
            if live.is_some() {
                verification
                    .discrepancies
                    .push("content differs from the file on disk".to_string());
            }
        }

        let declared = declared_names(live_text);
        let (contracts_ok, missing_contracts) =
            check_entities(&result.chunks, &declared, |c| c.kind.is_type_contract());
        let (code_ok, missing_code) = check_entities(&result.chunks, &declared, |c| c.kind.is_code_entity());
        for name in missing_contracts.iter().chain(&missing_code) {
            verification
                .discrepancies
                .push(format!("declaration of `{name}` not found"));
        }
        if !contracts_ok {
            score -= ENTITY_MISSING_PENALTY;
        }
        if !code_ok {
            score -= ENTITY_MISSING_PENALTY;
        }
        verification.entities_verified = contracts_ok && code_ok;

        let confidence = round_score(score).clamp(EXISTING_FLOOR, 1.0);
        verified.confidence_score = confidence;
        verified.match_type = self.classify(confidence);
        verified.verification = verification;
        verified
    }

    /// Drop only results that both fail to exist and sit at or below the floor.
    pub fn retain_policy(&self, result: &SearchResult) -> bool {
        result.verification.file_exists || result.confidence_score > self.thresholds.drop_floor
    }

    pub fn classify(&self, confidence: f64) -> MatchType {
        let t = &self.thresholds;
        if confidence >= t.exact {
            MatchType::Exact
        } else if confidence >= t.partial {
            MatchType::Partial
        } else if confidence >= t.inferred {
            MatchType::Inferred
        } else {
            MatchType::Synthetic
        }
    }

    fn absolute(&self, file_path: &str) -> PathBuf {
        let path = Path::new(file_path);
        if path.is_absolute() || self.root.as_os_str().is_empty() || self.root == Path::new(".") {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn relative(&self, actual: &Path) -> String {
        actual
            .strip_prefix(&self.root)
            .unwrap_or(actual)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// Four decimal places, so threshold comparisons are not decided by float noise.
fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

/// Polynomial rolling hash over line-ending-normalised, right-trimmed text.
pub fn content_hash(text: &str) -> u64 {
    let normalized = text.replace("\r\n", "\n");
    normalized
        .trim_end()
        .bytes()
        .fold(0u64, |acc, b| (acc * HASH_BASE + u64::from(b)) % HASH_MODULUS)
}

/// Whether every selected chunk's name is still declared in `text`.
fn check_entities(
    chunks: &[CodeChunk],
    declared: &HashSet<String>,
    select: impl Fn(&CodeChunk) -> bool,
) -> (bool, Vec<String>) {
    let mut missing = Vec::new();
    for chunk in chunks.iter().filter(|c| select(c)) {
        if !declared.contains(&chunk.name) && !missing.contains(&chunk.name) {
            missing.push(chunk.name.clone());
        }
    }
    (missing.is_empty(), missing)
}

/// Names introduced by bare, exported, export-group and default-export
/// declarations.
pub fn declared_names(text: &str) -> HashSet<String> {
    let mut names: HashSet<String> = DECLARATION_RE
        .captures_iter(text)
        .chain(DEFAULT_EXPORT_RE.captures_iter(text))
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect();
    for group in EXPORT_GROUP_RE.captures_iter(text).filter_map(|c| c.get(1)) {
        names.extend(
            group
                .as_str()
                .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        );
    }
    names
}

pub fn is_declared(text: &str, name: &str) -> bool {
    !name.is_empty() && declared_names(text).contains(name)
}
