//! The search pipeline behind `search_code`.
//!
//! Every request re-scans the tree: discover candidate files, chunk them in
//! parallel, link relationships across files, rank, verify against the
//! filesystem, filter and prune. Nothing is persisted between requests.
pub mod report;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::chunker::relations::{connect_relationships, prune_relationships};
use crate::chunker::{ChunkedFile, Chunker};
use crate::config::{Config, SearchConfig};
use crate::extractor::EntityExtractor;
use crate::fs::{Filesystem, is_confined};
use crate::model::ModelTier;
use crate::models::{ResultOrigin, SearchResult};
use crate::ranker::Ranker;
use crate::ranker::query::{QueryAnalysis, analyze};
use crate::verifier::Verifier;

/// Chunk scores summed into a file's relevance.
const TOP_CHUNKS_PER_FILE: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub text: String,
    /// Extension (`tsx`, `.tsx`) or glob (`*.test.ts`).
    pub file_type_filter: Option<String>,
    /// Directory relative to the root.
    pub directory_filter: Option<String>,
    /// Render the cross-file Relationships section even on the fast tier.
    pub include_dependencies: bool,
    pub max_results: Option<usize>,
    pub tier_hint: Option<ModelTier>,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Counts over every verified candidate, including dropped ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub fully_verified: usize,
    pub structural_mismatch: usize,
    pub not_found: usize,
    pub dropped: usize,
}

impl VerificationSummary {
    fn count(&mut self, result: &SearchResult) {
        let v = &result.verification;
        if !v.file_exists {
            self.not_found += 1;
        } else if v.content_matches && v.entities_verified {
            self.fully_verified += 1;
        } else {
            self.structural_mismatch += 1;
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub request: SearchRequest,
    pub analysis: QueryAnalysis,
    /// Retained results, most confident first.
    pub results: Vec<SearchResult>,
    pub summary: VerificationSummary,
    pub files_scanned: usize,
    pub show_relationships: bool,
}

pub struct SearchEngine {
    fs: Arc<dyn Filesystem>,
    root: PathBuf,
    chunker: Arc<Chunker>,
    ranker: Ranker,
    verifier: Arc<Verifier>,
    settings: SearchConfig,
    include: GlobSet,
}

impl SearchEngine {
    pub fn new(config: &Config, fs: Arc<dyn Filesystem>, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let extractor = Arc::new(EntityExtractor::new());
        let include = extension_globs(&config.search.extensions);
        Self {
            chunker: Arc::new(Chunker::new(extractor, config.search.context_lines)),
            ranker: Ranker::new(),
            verifier: Arc::new(Verifier::new(fs.clone(), root.clone(), config.verification)),
            fs,
            root,
            settings: config.search.clone(),
            include,
        }
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Run a request and render the report. Never fails: problems surface
    /// as a no-results report.
    pub async fn search(&self, request: &SearchRequest) -> String {
        let outcome = self.search_results(request).await;
        if outcome.results.is_empty() {
            report::render_no_results(&outcome)
        } else {
            report::render(&outcome)
        }
    }

    pub async fn search_results(&self, request: &SearchRequest) -> SearchOutcome {
        let analysis = analyze(&request.text);
        let tier = request.tier_hint.unwrap_or(ModelTier::Thorough);
        let budget = request
            .max_results
            .filter(|n| *n > 0)
            .unwrap_or(match tier {
                ModelTier::Fast => self.settings.fast_max_results,
                ModelTier::Thorough => self.settings.max_results,
            });
        let show_relationships = tier == ModelTier::Thorough || request.include_dependencies;

        let (forced, proposed) = self.split_mentions(&analysis);
        let only_paths = analysis.terms.is_empty()
            && analysis.entity_candidates.is_empty()
            && !analysis.path_mentions.is_empty();
        let discovered = if only_paths {
            Vec::new()
        } else {
            self.discover(request)
        };
        let files_scanned = discovered.len() + forced.iter().filter(|f| !discovered.contains(f)).count();
        debug!(files = files_scanned, forced = forced.len(), "discovered candidate files");

        let mut files = self.chunk_files(discovered, &forced, &analysis).await;
        connect_relationships(&mut files);

        let mut candidates: Vec<SearchResult> = Vec::new();
        for file in files {
            let is_forced = forced.contains(&file.path);
            let scored = self
                .ranker
                .rank_scored(&file.chunks, &analysis, self.settings.max_chunks_per_file);
            if scored.is_empty() && !is_forced {
                continue;
            }
            let mut scores: Vec<f64> = scored.iter().map(|(_, s)| *s).collect();
            scores.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
            let relevance: f64 = scores.iter().take(TOP_CHUNKS_PER_FILE).sum();

            let chunks = if scored.is_empty() {
                file.chunks
                    .iter()
                    .take(self.settings.max_chunks_per_file)
                    .cloned()
                    .collect()
            } else {
                scored.into_iter().map(|(chunk, _)| chunk).collect()
            };
            let mut result = SearchResult::new(file.path, file.content, ResultOrigin::Retrieved);
            result.chunks = chunks;
            result.relevance_score = relevance;
            candidates.push(result);
        }
        for path in proposed {
            candidates.push(SearchResult::new(path, String::new(), ResultOrigin::Proposed));
        }

        let ranked = self
            .ranker
            .rank_results(candidates, &analysis.terms, &analysis.file_name_candidates());
        let mut shortlisted: Vec<SearchResult> = Vec::new();
        let mut retrieved = 0usize;
        for result in ranked {
            if result.origin == ResultOrigin::Proposed {
                shortlisted.push(result);
            } else if retrieved < budget {
                retrieved += 1;
                shortlisted.push(result);
            }
        }

        let verified = self.verify_all(shortlisted).await;

        let mut summary = VerificationSummary::default();
        let mut results = Vec::new();
        for result in verified {
            summary.count(&result);
            if self.verifier.retain_policy(&result) {
                results.push(result);
            } else {
                summary.dropped += 1;
                debug!(path = %result.file_path, "dropped unverifiable result");
            }
        }
        results.sort_by(|a, b| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    b.relevance_score
                        .partial_cmp(&a.relevance_score)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        prune_relationships(&mut results);

        info!(
            query = %request.text,
            results = results.len(),
            verified = summary.fully_verified,
            not_found = summary.not_found,
            "search finished"
        );

        SearchOutcome {
            request: request.clone(),
            analysis,
            results,
            summary,
            files_scanned,
            show_relationships,
        }
    }

    /// Verify every file path a model answer mentions.
    pub async fn verify_claimed_paths(&self, answer: &str) -> Vec<SearchResult> {
        let claims: Vec<SearchResult> = analyze(answer)
            .path_mentions
            .into_iter()
            .map(|path| SearchResult::new(path, String::new(), ResultOrigin::Synthetic))
            .collect();
        self.verify_all(claims).await
    }

    /// Candidate files under the root, as `/`-separated relative paths.
    fn discover(&self, request: &SearchRequest) -> Vec<String> {
        let type_filter = request.file_type_filter.as_deref().and_then(file_type_glob);
        let dir_filter = request
            .directory_filter
            .as_deref()
            .map(normalize_relative)
            .filter(|d| !d.is_empty() && d != ".");

        let mut paths: Vec<String> = self
            .fs
            .walk(&self.root)
            .into_iter()
            .map(|p| self.relative(&p))
            .filter(|p| self.include.is_match(p.as_str()))
            .filter(|p| type_filter.as_ref().is_none_or(|g| g.is_match(p.as_str())))
            .filter(|p| {
                dir_filter
                    .as_deref()
                    .is_none_or(|d| p == d || p.starts_with(&format!("{d}/")))
            })
            .collect();
        paths.sort();
        if paths.len() > self.settings.max_files {
            warn!(
                "{} files found, scanning the first {}",
                paths.len(),
                self.settings.max_files
            );
            paths.truncate(self.settings.max_files);
        }
        paths
    }

    /// Path mentions that exist under the root are always scanned; the rest
    /// become proposals, which verification reports as not found.
    fn split_mentions(&self, analysis: &QueryAnalysis) -> (Vec<String>, Vec<String>) {
        let mut forced = Vec::new();
        let mut proposed = Vec::new();
        for mention in &analysis.path_mentions {
            let mention = normalize_relative(mention);
            if !is_confined(Path::new(&mention)) {
                debug!(path = %mention, "mention points outside the project root");
                proposed.push(mention);
                continue;
            }
            match self.fs.resolve(&self.absolute(&mention)) {
                Some(actual) => {
                    let path = self.relative(&actual);
                    if !forced.contains(&path) {
                        forced.push(path);
                    }
                }
                None => proposed.push(mention),
            }
        }
        (forced, proposed)
    }

    /// Read, prefilter and chunk files on blocking workers.
    async fn chunk_files(&self, discovered: Vec<String>, forced: &[String], analysis: &QueryAnalysis) -> Vec<ChunkedFile> {
        let mut paths = discovered;
        for path in forced {
            if !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        let needles: Arc<Vec<String>> = Arc::new(
            analysis
                .terms
                .iter()
                .cloned()
                .chain(analysis.entity_candidates.iter().map(|c| c.to_lowercase()))
                .collect(),
        );

        let semaphore = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let mut join_set = JoinSet::new();
        for path in paths {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let fs = Arc::clone(&self.fs);
            let chunker = Arc::clone(&self.chunker);
            let needles = Arc::clone(&needles);
            let absolute = self.absolute(&path);
            let is_forced = forced.contains(&path);
            join_set.spawn_blocking(move || {
                let _permit = permit;
                let text = match fs.read_to_string(&absolute) {
                    Ok(text) => text,
                    Err(e) => {
                        debug!("Skipping unreadable file {path}: {e}");
                        return None;
                    }
                };
                if !is_forced && !mentions_any(&path, &text, &needles) {
                    return None;
                }
                Some(chunker.build_chunks(&path, &text))
            });
        }

        let mut files = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Some(file)) => files.push(file),
                Ok(None) => {}
                Err(e) => warn!("Chunking task failed: {e}"),
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Verify results on blocking workers, keeping input order.
    async fn verify_all(&self, results: Vec<SearchResult>) -> Vec<SearchResult> {
        let total = results.len();
        let semaphore = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let mut join_set = JoinSet::new();
        for (i, result) in results.into_iter().enumerate() {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let verifier = Arc::clone(&self.verifier);
            join_set.spawn_blocking(move || {
                let _permit = permit;
                (i, verifier.verify(&result))
            });
        }

        let mut slots: HashMap<usize, SearchResult> = HashMap::with_capacity(total);
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((i, result)) => {
                    slots.insert(i, result);
                }
                Err(e) => warn!("Verification task failed: {e}"),
            }
        }
        (0..total).filter_map(|i| slots.remove(&i)).collect()
    }

    fn absolute(&self, relative: &str) -> PathBuf {
        let path = Path::new(relative);
        if path.is_absolute() || self.root.as_os_str().is_empty() || self.root == Path::new(".") {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn relative(&self, path: &Path) -> String {
        let shown = path.strip_prefix(&self.root).unwrap_or(path);
        normalize_relative(&shown.to_string_lossy())
    }
}

fn extension_globs(extensions: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for ext in extensions {
        match Glob::new(&format!("*.{}", ext.trim_start_matches('.'))) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => warn!("Ignoring extension {ext}: {e}"),
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

/// `tsx`, `.tsx` and `*.tsx` all mean the extension; anything else with a
/// wildcard is used as a glob.
fn file_type_glob(filter: &str) -> Option<GlobSet> {
    let filter = filter.trim();
    if filter.is_empty() {
        return None;
    }
    let pattern = if filter.contains('*') || filter.contains('?') {
        filter.to_string()
    } else {
        format!("*.{}", filter.trim_start_matches('.'))
    };
    let glob = Glob::new(&pattern).ok()?;
    let mut builder = GlobSetBuilder::new();
    builder.add(glob);
    builder.build().ok()
}

fn normalize_relative(path: &str) -> String {
    let path = path.replace('\\', "/");
    let trimmed = path.trim_start_matches("./").trim_end_matches('/');
    trimmed.to_string()
}

fn mentions_any(path: &str, text: &str, needles: &[String]) -> bool {
    if needles.is_empty() {
        return true;
    }
    let path = path.to_lowercase();
    let text = text.to_lowercase();
    needles
        .iter()
        .any(|n| path.contains(n.as_str()) || text.contains(n.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;
    use crate::models::MatchType;

    fn engine(files: &[(&str, &str)]) -> SearchEngine {
        let fs = MemoryFs::new();
        for (path, content) in files {
            fs.insert(*path, *content);
        }
        SearchEngine::new(&Config::default(), Arc::new(fs), ".")
    }

    #[test]
    fn test_discover_filters() {
        let engine = engine(&[
            ("src/components/Widget.tsx", "export function Widget() {}"),
            ("src/lib/util.ts", "export const x = 1;"),
            ("README.md", "# readme"),
        ]);
        let all = engine.discover(&SearchRequest::new("x"));
        assert_eq!(all, vec!["src/components/Widget.tsx", "src/lib/util.ts"]);

        let tsx = engine.discover(&SearchRequest {
            file_type_filter: Some(".tsx".to_string()),
            ..SearchRequest::new("x")
        });
        assert_eq!(tsx, vec!["src/components/Widget.tsx"]);

        let lib = engine.discover(&SearchRequest {
            directory_filter: Some("./src/lib/".to_string()),
            ..SearchRequest::new("x")
        });
        assert_eq!(lib, vec!["src/lib/util.ts"]);
    }

    #[tokio::test]
    async fn test_search_finds_component() {
        let engine = engine(&[
            (
                "src/components/Widget.tsx",
                "export function Widget() {\n  return <div/>;\n}\n",
            ),
            ("src/lib/math.ts", "export function add(a: number, b: number) {\n  return a + b;\n}\n"),
        ]);
        let outcome = engine.search_results(&SearchRequest::new("find the Widget component")).await;
        assert_eq!(outcome.results.len(), 1);
        let result = &outcome.results[0];
        assert_eq!(result.file_path, "src/components/Widget.tsx");
        assert_eq!(result.match_type, MatchType::Exact);
        assert_eq!(outcome.summary.fully_verified, 1);
        assert_eq!(outcome.files_scanned, 2);
    }

    #[tokio::test]
    async fn test_missing_path_mention_is_dropped() {
        let engine = engine(&[("src/components/Widget.tsx", "export function Widget() {\n  return <div/>;\n}\n")]);
        let outcome = engine
            .search_results(&SearchRequest::new("what does src/components/Missing.tsx render"))
            .await;
        assert!(outcome.results.iter().all(|r| r.file_path != "src/components/Missing.tsx"));
        assert_eq!(outcome.summary.not_found, 1);
        assert_eq!(outcome.summary.dropped, 1);
    }

    #[tokio::test]
    async fn test_existing_path_mention_is_forced() {
        let engine = engine(&[("src/lib/dates.ts", "export const FORMAT = 'yyyy';\n")]);
        let outcome = engine
            .search_results(&SearchRequest::new("explain src/lib/Dates.ts"))
            .await;
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].file_path, "src/lib/dates.ts");
        assert_eq!(outcome.files_scanned, 1);

        // A request naming only the path still counts the file it read.
        let outcome = engine
            .search_results(&SearchRequest::new("show src/lib/Dates.ts"))
            .await;
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.files_scanned, 1);
    }

    #[tokio::test]
    async fn test_dot_slash_mention_resolves_under_root() {
        let engine = engine(&[("src/lib/dates.ts", "export const FORMAT = 'yyyy';\n")]);
        let outcome = engine
            .search_results(&SearchRequest::new("explain ./src/lib/dates.ts"))
            .await;
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].file_path, "src/lib/dates.ts");
        assert!(outcome.results[0].verification.file_exists);

        let claims = engine.verify_claimed_paths("See ./src/lib/dates.ts").await;
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].file_path, "src/lib/dates.ts");
        assert!(claims[0].verification.file_exists);
    }

    #[tokio::test]
    async fn test_mentions_outside_root_are_never_read() {
        let fs = MemoryFs::new();
        fs.insert("proj/src/a.ts", "export const a = 1;\n");
        fs.insert("secret.ts", "export const API_KEY = 'hunter2';\n");
        let engine = SearchEngine::new(&Config::default(), Arc::new(fs), "proj");

        let request = SearchRequest::new("show src/../../secret.ts and ../secret.ts");
        let outcome = engine.search_results(&request).await;
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.summary.not_found, 2);
        assert_eq!(outcome.summary.dropped, 2);
        assert_eq!(outcome.files_scanned, 0);
        assert!(!engine.search(&request).await.contains("hunter2"));

        let claims = engine.verify_claimed_paths("copied from ../secret.ts").await;
        assert_eq!(claims.len(), 1);
        assert!(!claims[0].verification.file_exists);
        assert_eq!(claims[0].confidence_score, 0.01);
    }

    #[tokio::test]
    async fn test_fast_tier_budget() {
        let files: Vec<(String, String)> = (0..8)
            .map(|i| {
                (
                    format!("src/w{i}.ts"),
                    format!("export function widget{i}() {{\n  return 'widget';\n}}\n"),
                )
            })
            .collect();
        let refs: Vec<(&str, &str)> = files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
        let engine = engine(&refs);
        let outcome = engine
            .search_results(&SearchRequest {
                tier_hint: Some(ModelTier::Fast),
                ..SearchRequest::new("widget")
            })
            .await;
        assert_eq!(outcome.results.len(), 5);
        assert!(!outcome.show_relationships);
    }

    #[tokio::test]
    async fn test_verify_claimed_paths() {
        let engine = engine(&[("src/components/Widget.tsx", "export function Widget() {}\n")]);
        let claims = engine
            .verify_claimed_paths("See src/components/Widget.tsx and src/components/Ghost.tsx.")
            .await;
        assert_eq!(claims.len(), 2);
        assert!(claims[0].verification.file_exists);
        assert!(!claims[1].verification.file_exists);
        assert_eq!(claims[1].confidence_score, 0.01);
    }

    #[test]
    fn test_helpers() {
        assert_eq!(normalize_relative("./src/lib/"), "src/lib");
        assert!(mentions_any("src/Widget.tsx", "", &["widget".to_string()]));
        assert!(!mentions_any("src/a.ts", "const b = 1;", &["widget".to_string()]));
        assert!(file_type_glob("*.test.ts").is_some_and(|g| g.is_match("src/a.test.ts")));
        assert!(file_type_glob("tsx").is_some_and(|g| !g.is_match("src/a.ts")));
    }
}
