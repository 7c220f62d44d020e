/// End-to-end integration tests for the codescout pipeline.
///
/// Tests the complete flow:
///   Config → Discover → Chunk → Link → Rank → Verify → Report
/// plus the fast/thorough escalation loop with a file-backed feedback log.
use async_trait::async_trait;
use codescout::chunker::ChunkKind;
use codescout::config::Config;
use codescout::escalation::feedback::FileFeedbackSink;
use codescout::escalation::{EscalationController, QueryRequest};
use codescout::fs::{Filesystem, LocalFs};
use codescout::model::{AssistantResponse, Message, ModelError, ModelQuery, ModelTier, ToolSet, Usage};
use codescout::models::MatchType;
use codescout::search::{SearchEngine, SearchRequest};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn engine(root: &Path) -> SearchEngine {
    let fs: Arc<dyn Filesystem> = Arc::new(LocalFs);
    SearchEngine::new(&Config::default(), fs, root)
}

/// A component that exists is found, verified and reported as exact.
#[tokio::test]
async fn test_find_existing_component() {
    let dir = tempdir().unwrap();
    write(dir.path(), "src/components/Widget.tsx", "export function Widget() { return <div/> }\n");
    write(dir.path(), "src/lib/math.ts", "export const add = (a: number, b: number) => a + b;\n");

    let engine = engine(dir.path());
    let request = SearchRequest::new("find the Widget component");
    let outcome = engine.search_results(&request).await;

    assert_eq!(outcome.results.len(), 1, "Only Widget.tsx mentions the widget");
    let result = &outcome.results[0];
    assert_eq!(result.file_path, "src/components/Widget.tsx");
    assert!(result.verification.file_exists);
    assert!(result.verification.content_matches);
    assert!(result.verification.entities_verified);
    assert!(result.confidence_score >= 0.8, "got {}", result.confidence_score);
    assert_eq!(result.match_type, MatchType::Exact);
    assert!(
        result
            .chunks
            .iter()
            .any(|c| c.name == "Widget" && c.kind == ChunkKind::UiComponent),
        "Widget should be chunked as a UI component"
    );
    assert_eq!(outcome.summary.fully_verified, 1);

    let report = engine.search(&request).await;
    assert!(report.contains("Path: src/components/Widget.tsx"), "report: {report}");
    assert!(report.contains("Verification summary: 1 fully verified"), "report: {report}");
}

/// A path the user names that does not exist never surfaces as a result.
#[tokio::test]
async fn test_missing_path_is_suppressed() {
    let dir = tempdir().unwrap();
    write(dir.path(), "src/components/Widget.tsx", "export function Widget() { return <div/> }\n");

    let engine = engine(dir.path());
    let request = SearchRequest::new("show me src/components/Missing.tsx");
    let outcome = engine.search_results(&request).await;

    assert!(outcome.results.is_empty(), "got {:?}", outcome.results);
    assert_eq!(outcome.summary.not_found, 1);
    assert_eq!(outcome.summary.dropped, 1);

    let report = engine.search(&request).await;
    assert!(report.starts_with("No relevant information found"), "report: {report}");
}

/// Mentions are resolved against the project root and never escape it.
#[tokio::test]
async fn test_path_mentions_stay_inside_root() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("proj");
    write(&root, "src/lib/dates.ts", "export const FORMAT = 'yyyy';\n");
    write(dir.path(), "secret.ts", "export const API_KEY = 'hunter2';\n");

    let engine = engine(&root);
    let outcome = engine
        .search_results(&SearchRequest::new("explain ./src/lib/dates.ts"))
        .await;
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].file_path, "src/lib/dates.ts");

    let report = engine.search(&SearchRequest::new("show src/../../secret.ts")).await;
    assert!(!report.contains("hunter2"), "report: {report}");
    assert!(report.starts_with("No relevant information found"), "report: {report}");

    let claims = engine
        .verify_claimed_paths("See ./src/lib/dates.ts and ../secret.ts")
        .await;
    let found: Vec<(&str, bool)> = claims
        .iter()
        .map(|c| (c.file_path.as_str(), c.verification.file_exists))
        .collect();
    assert_eq!(found, vec![("src/lib/dates.ts", true), ("../secret.ts", false)]);
}

/// A props interface links to the component that consumes it.
#[tokio::test]
async fn test_props_contract_relationship() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "src/Widget.tsx",
        "export interface WidgetProps {\n  title: string;\n}\n\nexport function Widget({ title }: WidgetProps) {\n  return <div>{title}</div>;\n}\n",
    );

    let engine = engine(dir.path());
    let outcome = engine.search_results(&SearchRequest::new("WidgetProps")).await;
    assert_eq!(outcome.results.len(), 1);

    let chunks = &outcome.results[0].chunks;
    let props = chunks.iter().find(|c| c.name == "WidgetProps").expect("WidgetProps chunk");
    let widget = chunks.iter().find(|c| c.name == "Widget").expect("Widget chunk");
    assert_eq!(props.metadata.relationship_context.used_by_entities, vec!["Widget".to_string()]);
    assert!(
        widget
            .metadata
            .relationship_context
            .related_entities
            .contains(&"WidgetProps".to_string())
    );
}

/// Imports across files show up in the relationships section of the report.
#[tokio::test]
async fn test_cross_file_imports_reported() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "src/components/Button.tsx",
        "export function Button() {\n  return <button />;\n}\n",
    );
    write(
        dir.path(),
        "src/Toolbar.tsx",
        "import { Button } from './components/Button';\n\nexport function Toolbar() {\n  return <Button />;\n}\n",
    );

    let engine = engine(dir.path());
    let request = SearchRequest::new("where is Button imported");
    let outcome = engine.search_results(&request).await;
    let paths: Vec<&str> = outcome.results.iter().map(|r| r.file_path.as_str()).collect();
    assert!(paths.contains(&"src/components/Button.tsx"), "paths: {paths:?}");
    assert!(paths.contains(&"src/Toolbar.tsx"), "paths: {paths:?}");

    let button = outcome
        .results
        .iter()
        .find(|r| r.file_path == "src/components/Button.tsx")
        .unwrap();
    let chunk = button.chunks.iter().find(|c| c.name == "Button").unwrap();
    assert_eq!(
        chunk.metadata.relationship_context.imported_by,
        vec!["src/Toolbar.tsx".to_string()]
    );
}

/// Verifying an already-verified result changes nothing; losing the file lowers confidence.
#[tokio::test]
async fn test_verification_idempotent_and_monotonic() {
    let dir = tempdir().unwrap();
    write(dir.path(), "src/components/Widget.tsx", "export function Widget() { return <div/> }\n");

    let engine = engine(dir.path());
    let outcome = engine.search_results(&SearchRequest::new("Widget component")).await;
    let result = outcome.results[0].clone();

    let again = engine.verifier().verify(&result);
    assert_eq!(again, result);

    fs::remove_file(dir.path().join("src/components/Widget.tsx")).unwrap();
    let gone = engine.verifier().verify(&result);
    assert!(!gone.verification.file_exists);
    assert!(gone.confidence_score < result.confidence_score);
    assert!(!engine.verifier().retain_policy(&gone));
}

/// Edits after retrieval are caught as content drift but the file is kept.
#[tokio::test]
async fn test_content_drift_detected() {
    let dir = tempdir().unwrap();
    write(dir.path(), "src/components/Widget.tsx", "export function Widget() { return <div/> }\n");

    let engine = engine(dir.path());
    let outcome = engine.search_results(&SearchRequest::new("Widget component")).await;
    let result = outcome.results[0].clone();

    write(
        dir.path(),
        "src/components/Widget.tsx",
        "export function Widget() { return <div/> }\nexport const extra = 1;\n",
    );
    let drifted = engine.verifier().verify(&result);
    assert!(drifted.verification.file_exists);
    assert!(!drifted.verification.content_matches);
    assert!(drifted.verification.entities_verified);
    assert!(drifted.confidence_score < result.confidence_score);
    assert_ne!(drifted.match_type, MatchType::Exact);
    assert!(engine.verifier().retain_policy(&drifted));
}

/// Paths cited by a model answer are checked against the tree.
#[tokio::test]
async fn test_claimed_paths_verified() {
    let dir = tempdir().unwrap();
    write(dir.path(), "src/components/Widget.tsx", "export function Widget() { return <div/> }\n");

    let engine = engine(dir.path());
    let claims = engine
        .verify_claimed_paths("See src/components/Widget.tsx and src/components/Ghost.tsx")
        .await;
    assert_eq!(claims.len(), 2);
    let ghost = claims.iter().find(|c| c.file_path.ends_with("Ghost.tsx")).unwrap();
    assert!(!ghost.verification.file_exists);
    assert_eq!(ghost.confidence_score, 0.01);
    let widget = claims.iter().find(|c| c.file_path.ends_with("Widget.tsx")).unwrap();
    assert!(widget.verification.file_exists);
}

// ── Escalation ──────────────────────────────────────────────────────

struct ScriptedModel {
    replies: Mutex<VecDeque<Result<AssistantResponse, ModelError>>>,
    tiers: Mutex<Vec<ModelTier>>,
}

#[async_trait]
impl ModelQuery for ScriptedModel {
    async fn query(
        &self,
        _conversation: &[Message],
        _system_prompt: &str,
        _tools: &ToolSet,
        tier: ModelTier,
        _model: &str,
    ) -> Result<AssistantResponse, ModelError> {
        self.tiers.lock().unwrap().push(tier);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Transport("script exhausted".to_string())))
    }
}

/// A fast answer admitting it found nothing escalates and the outcome is logged.
#[tokio::test]
async fn test_escalation_writes_feedback_log() {
    let dir = tempdir().unwrap();
    let log_path = dir.path().join("logs/feedback.json");
    let good = "Path: src/components/Widget.tsx\nAnalysis: Widget renders a div and takes no props.";
    let model = Arc::new(ScriptedModel {
        replies: Mutex::new(
            vec![
                Ok(AssistantResponse::assistant(
                    "fast-m",
                    "I couldn't find any matching files",
                    Usage { input_tokens: 10, output_tokens: 5 },
                )),
                Ok(AssistantResponse::assistant(
                    "thorough-m",
                    good,
                    Usage { input_tokens: 40, output_tokens: 25 },
                )),
            ]
            .into(),
        ),
        tiers: Mutex::new(Vec::new()),
    });
    let sink = Arc::new(FileFeedbackSink::new(&log_path));
    let controller = EscalationController::new(model.clone(), sink.clone(), "fast-m", "thorough-m").unwrap();

    let result = controller
        .run(&QueryRequest::new("find the Widget component"), &CancellationToken::new())
        .await
        .unwrap();

    assert!(result.successful);
    assert!(result.escalated);
    assert_eq!(result.model_used, "thorough-m");
    assert_eq!(result.response, good);
    assert_eq!(result.input_tokens, 50);
    assert_eq!(result.output_tokens, 30);
    assert_eq!(*model.tiers.lock().unwrap(), vec![ModelTier::Fast, ModelTier::Thorough]);

    let records = sink.load().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].escalated);
    assert!(records[0].successful);
    assert!(!records[0].fast.success);
    assert!(records[0].thorough.as_ref().is_some_and(|t| t.success));
}

/// Config defaults pass validation and survive a save/load cycle.
#[test]
fn test_config_save_and_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("codescout.json");
    let mut config = Config::default();
    config.search.max_results = 3;
    config.save(path.to_str().unwrap()).unwrap();

    let loaded = Config::load(path.to_str().unwrap()).unwrap();
    assert_eq!(loaded.search.max_results, 3);
    assert!(loaded.validate().is_ok());
}
