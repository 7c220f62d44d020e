//! Relevance ranking.
//!
//! Scores are additive and deterministic. Chunk scoring favours name
//! matches over content matches, then applies domain-category, export,
//! documentation and size adjustments. File-level ranking adds file-name
//! bonuses and assigns each result its prior confidence.
pub mod query;

use std::cmp::Ordering;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use self::query::{QueryAnalysis, QueryCategory};
use crate::chunker::{ChunkKind, CodeChunk};
use crate::models::SearchResult;

static RENDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:return|=>)\s*\(?\s*<[A-Za-z>]|\brender\s*\(|</[A-Za-z][\w.]*>")
        .expect("render regex is valid")
});
static EVENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bon[A-Z]\w*|\bhandle[A-Z]\w*|addEventListener|\.emit\(|dispatch\(")
        .expect("event regex is valid")
});
static TEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:describe|it|test)\s*\(|\bexpect\s*\(").expect("test regex is valid")
});

const EXACT_NAME: f64 = 100.0;
const NAME_CONTAINS_QUERY: f64 = 50.0;
const NAME_CONTAINS_TERM: f64 = 20.0;
const CONTENT_CONTAINS_QUERY: f64 = 15.0;
const WORD_MATCH: f64 = 3.0;
const SUBSTRING_MATCH: f64 = 1.0;
const TERM_FREQUENCY_CAP: f64 = 15.0;
const UI_COMPONENT_BONUS: f64 = 15.0;
const RENDER_PATTERN_BONUS: f64 = 5.0;
const IMPORTS_BONUS: f64 = 10.0;
const IMPORTS_PENALTY: f64 = -10.0;
const CATEGORY_BONUS: f64 = 8.0;
const EXPORT_BONUS: f64 = 5.0;
const DOC_BONUS: f64 = 3.0;
const SIZE_BONUS: f64 = 5.0;
const SIZE_PENALTY: f64 = -5.0;

const STEM_EQUALS_CANDIDATE: f64 = 50.0;
const STEM_CONTAINS_CANDIDATE: f64 = 25.0;
const PATH_CONTAINS_TERM: f64 = 5.0;

pub const PRIOR_FLOOR: f64 = 0.5;
pub const PRIOR_SPAN: f64 = 0.25;

#[derive(Debug, Clone, Copy, Default)]
pub struct Ranker;

impl Ranker {
    pub fn new() -> Self {
        Self
    }

    pub fn score_chunk(&self, chunk: &CodeChunk, analysis: &QueryAnalysis) -> f64 {
        let mut score = 0.0;
        let name = chunk.name.to_lowercase();
        let content = chunk.content.to_lowercase();
        let query = analysis.text.as_str();

        if chunk.kind != ChunkKind::Imports {
            let exact = name == query
                || analysis
                    .entity_candidates
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(&chunk.name));
            if exact {
                score += EXACT_NAME;
            } else if !query.is_empty() && name.contains(query) {
                score += NAME_CONTAINS_QUERY;
            }
            for term in &analysis.terms {
                if name.contains(term.as_str()) {
                    score += NAME_CONTAINS_TERM;
                }
            }
        }

        if query.len() > 3 && content.contains(query) {
            score += CONTENT_CONTAINS_QUERY;
        }

        for term in &analysis.terms {
            score += term_frequency(&content, term);
        }

        if analysis.has(QueryCategory::Ui) {
            if chunk.kind == ChunkKind::UiComponent {
                score += UI_COMPONENT_BONUS;
            }
            if RENDER_RE.is_match(&chunk.content) {
                score += RENDER_PATTERN_BONUS;
            }
        }
        if chunk.kind == ChunkKind::Imports {
            score += if analysis.has(QueryCategory::Relationship) {
                IMPORTS_BONUS
            } else {
                IMPORTS_PENALTY
            };
        }
        if analysis.has(QueryCategory::Data) && chunk.kind.is_type_contract() {
            score += CATEGORY_BONUS;
        }
        if analysis.has(QueryCategory::Utility)
            && chunk.kind == ChunkKind::Function
            && !RENDER_RE.is_match(&chunk.content)
        {
            score += CATEGORY_BONUS;
        }
        if analysis.has(QueryCategory::Event) && EVENT_RE.is_match(&chunk.content) {
            score += CATEGORY_BONUS;
        }
        if analysis.has(QueryCategory::Testing) && (is_test_path(&chunk.file_path) || TEST_RE.is_match(&chunk.content)) {
            score += CATEGORY_BONUS;
        }

        if chunk.metadata.is_exported {
            score += EXPORT_BONUS;
        }
        if chunk.metadata.documentation.is_some() {
            score += DOC_BONUS;
        }

        let lines = chunk.line_count();
        if (5..=100).contains(&lines) {
            score += SIZE_BONUS;
        } else if lines > 300 {
            score += SIZE_PENALTY;
        }

        score
    }

    /// Rank `chunks` against a raw request string.
    pub fn rank(&self, chunks: &[CodeChunk], request: &str, max_results: usize) -> Vec<CodeChunk> {
        let analysis = query::analyze(request);
        self.rank_scored(chunks, &analysis, max_results)
            .into_iter()
            .map(|(chunk, _)| chunk)
            .collect()
    }

    /// Top `max_results` positively scored chunks plus the parents of any
    /// selected method, in display order.
    pub fn rank_scored(&self, chunks: &[CodeChunk], analysis: &QueryAnalysis, max_results: usize) -> Vec<(CodeChunk, f64)> {
        let mut scored: Vec<(usize, f64)> = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i, self.score_chunk(c, analysis)))
            .filter(|(_, s)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| chunks[a.0].file_path.cmp(&chunks[b.0].file_path))
                .then_with(|| chunks[a.0].start_line.cmp(&chunks[b.0].start_line))
        });
        scored.truncate(max_results);

        let mut selected: Vec<(usize, f64)> = scored.clone();
        for &(i, _) in &scored {
            let Some(parent) = chunks[i].metadata.parent_name.as_deref() else {
                continue;
            };
            let present = selected
                .iter()
                .any(|&(j, _)| chunks[j].name == parent && chunks[j].file_path == chunks[i].file_path);
            if present {
                continue;
            }
            let owner = chunks.iter().enumerate().find(|(_, c)| {
                c.name == parent && c.file_path == chunks[i].file_path && c.kind != ChunkKind::Method
            });
            if let Some((j, owner)) = owner {
                selected.push((j, self.score_chunk(owner, analysis)));
            }
        }

        selected.sort_by(|a, b| display_order(&chunks[a.0], &chunks[b.0]));
        selected
            .into_iter()
            .map(|(i, score)| (chunks[i].clone(), score))
            .collect()
    }

    /// Add file-name bonuses, order by relevance and assign prior confidence.
    pub fn rank_results(
        &self,
        mut results: Vec<SearchResult>,
        terms: &[String],
        file_name_candidates: &[String],
    ) -> Vec<SearchResult> {
        for result in &mut results {
            let path = result.file_path.to_lowercase();
            let stem = Path::new(&path)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();

            let mut bonus = 0.0;
            let candidates: Vec<String> = file_name_candidates.iter().map(|c| c.to_lowercase()).collect();
            if candidates.iter().any(|c| *c == stem) {
                bonus += STEM_EQUALS_CANDIDATE;
            } else if candidates.iter().any(|c| !c.is_empty() && stem.contains(c.as_str())) {
                bonus += STEM_CONTAINS_CANDIDATE;
            }
            for term in terms {
                if path.contains(term.as_str()) {
                    bonus += PATH_CONTAINS_TERM;
                }
            }
            result.relevance_score += bonus;
        }

        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.file_path.cmp(&b.file_path))
        });

        let best = results
            .iter()
            .map(|r| r.relevance_score)
            .fold(0.0_f64, f64::max);
        for result in &mut results {
            result.prior_confidence = prior_confidence(result.relevance_score, best);
            result.confidence_score = result.prior_confidence;
        }
        results
    }
}

/// `0.5 + 0.25 * relevance / best`, or `0.5` when nothing scored.
pub fn prior_confidence(relevance: f64, best: f64) -> f64 {
    if best <= 0.0 {
        return PRIOR_FLOOR;
    }
    PRIOR_FLOOR + PRIOR_SPAN * (relevance.max(0.0) / best).min(1.0)
}

fn term_frequency(content: &str, term: &str) -> f64 {
    if term.is_empty() {
        return 0.0;
    }
    let is_ident = |c: char| c.is_alphanumeric() || c == '_' || c == '$';
    let mut words = 0usize;
    let mut substrings = 0usize;
    for (idx, _) in content.match_indices(term) {
        let before = content[..idx].chars().next_back();
        let after = content[idx + term.len()..].chars().next();
        if !before.is_some_and(is_ident) && !after.is_some_and(is_ident) {
            words += 1;
        } else {
            substrings += 1;
        }
    }
    (words as f64 * WORD_MATCH + substrings as f64 * SUBSTRING_MATCH).min(TERM_FREQUENCY_CAP)
}

fn is_test_path(path: &str) -> bool {
    path.contains(".test.") || path.contains(".spec.") || path.contains("__tests__")
}

fn display_order(a: &CodeChunk, b: &CodeChunk) -> Ordering {
    a.file_path
        .cmp(&b.file_path)
        .then_with(|| a.kind.importance().cmp(&b.kind.importance()))
        .then_with(|| a.start_line.cmp(&b.start_line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::Chunker;
    use crate::extractor::EntityExtractor;
    use crate::models::ResultOrigin;
    use std::sync::Arc;

    fn chunks(path: &str, text: &str) -> Vec<CodeChunk> {
        Chunker::new(Arc::new(EntityExtractor::new()), 0)
            .build_chunks(path, text)
            .chunks
    }

    const WIDGETS: &str = r#"import React from 'react';

export function Widget() {
  return <div className="widget" />;
}

export function widgetCount(items: string[]) {
  return items.length;
}

export class WidgetStore {
  load() {
    return [];
  }

  save() {
    return true;
  }
}
"#;

    #[test]
    fn test_exact_name_ranks_first() {
        let ranker = Ranker::new();
        let analysis = query::analyze("find the Widget component");
        let ranked = ranker.rank_scored(&chunks("src/Widget.tsx", WIDGETS), &analysis, 1);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0.name, "Widget");
        assert_eq!(ranked[0].0.kind, ChunkKind::UiComponent);
        assert!(ranked[0].1 >= EXACT_NAME);
    }

    #[test]
    fn test_parent_is_included_with_method() {
        let ranker = Ranker::new();
        let ranked = ranker.rank(&chunks("src/Widget.tsx", WIDGETS), "save", 1);
        let names: Vec<&str> = ranked.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["WidgetStore", "save"]);
    }

    #[test]
    fn test_display_order_by_type_importance() {
        let ranker = Ranker::new();
        let ranked = ranker.rank(&chunks("src/Widget.tsx", WIDGETS), "widget", 10);
        let kinds: Vec<ChunkKind> = ranked.iter().map(|c| c.kind).collect();
        let mut sorted = kinds.clone();
        sorted.sort_by_key(|k| k.importance());
        assert_eq!(kinds, sorted);
        assert_eq!(ranked[0].kind, ChunkKind::UiComponent);
        assert!(ranked.iter().all(|c| c.kind != ChunkKind::Imports));
    }

    #[test]
    fn test_imports_boosted_for_relationship_queries() {
        let ranker = Ranker::new();
        let all = chunks("src/Widget.tsx", WIDGETS);
        let imports = all.iter().find(|c| c.kind == ChunkKind::Imports).unwrap();

        let plain = query::analyze("react widget");
        let relational = query::analyze("what imports react");
        assert!(ranker.score_chunk(imports, &relational) > ranker.score_chunk(imports, &plain));
    }

    #[test]
    fn test_term_frequency_prefers_whole_words() {
        assert_eq!(term_frequency("load(); load();", "load"), 6.0);
        assert_eq!(term_frequency("loader loaded", "load"), 2.0);
        assert_eq!(term_frequency(&"load ".repeat(20), "load"), TERM_FREQUENCY_CAP);
    }

    #[test]
    fn test_rank_results_assigns_prior() {
        let ranker = Ranker::new();
        let mut a = SearchResult::new("src/Widget.tsx", "", ResultOrigin::Retrieved);
        a.relevance_score = 40.0;
        let mut b = SearchResult::new("src/lib/helpers.ts", "", ResultOrigin::Retrieved);
        b.relevance_score = 45.0;
        let mut c = SearchResult::new("src/empty.ts", "", ResultOrigin::Retrieved);
        c.relevance_score = 0.0;

        let ranked = ranker.rank_results(vec![a, b, c], &["widget".to_string()], &["Widget".to_string()]);
        assert_eq!(ranked[0].file_path, "src/Widget.tsx");
        assert_eq!(ranked[0].relevance_score, 95.0);
        assert_eq!(ranked[0].prior_confidence, 0.75);
        assert!((ranked[1].prior_confidence - (0.5 + 0.25 * 45.0 / 95.0)).abs() < 1e-9);
        assert_eq!(ranked[2].prior_confidence, 0.5);
        assert!(ranked.iter().all(|r| r.confidence_score == r.prior_confidence));
    }

    #[test]
    fn test_prior_confidence_bounds() {
        assert_eq!(prior_confidence(10.0, 0.0), 0.5);
        assert_eq!(prior_confidence(-5.0, 10.0), 0.5);
        assert_eq!(prior_confidence(10.0, 10.0), 0.75);
    }
}
