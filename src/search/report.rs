//! Plain-text rendering of search outcomes.
use std::fmt::Write;

use super::{SearchOutcome, VerificationSummary};
use crate::chunker::CodeChunk;
use crate::extractor::ChildEntity;
use crate::models::{MatchType, SearchResult};

pub const RESULT_DELIMITER: &str =
    "================================================================================";
const CHUNK_RULE: &str = "----------------------------------------";

/// Suffixes removed when suggesting a base entity name.
const BASE_NAME_SUFFIXES: &[&str] = &["Props", "FormFields", "Fields", "Form", "State", "Context"];

pub fn render(outcome: &SearchOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Found {} verified result(s) for \"{}\" ({} files scanned)",
        outcome.results.len(),
        outcome.request.text,
        outcome.files_scanned
    );

    for result in &outcome.results {
        out.push_str(RESULT_DELIMITER);
        out.push('\n');
        render_result(&mut out, result);
    }
    out.push_str(RESULT_DELIMITER);
    out.push('\n');

    if outcome.show_relationships {
        let lines = relationship_lines(&outcome.results);
        if !lines.is_empty() {
            out.push_str("Relationships:\n");
            for line in lines {
                let _ = writeln!(out, "- {line}");
            }
            out.push('\n');
        }
    }

    out.push_str(&summary_line(&outcome.summary));
    out
}

/// Report for an empty result set, with concrete next steps.
pub fn render_no_results(outcome: &SearchOutcome) -> String {
    let mut out = String::new();
    let request = &outcome.request;
    let analysis = &outcome.analysis;

    let _ = writeln!(out, "No relevant information found for \"{}\".", request.text);
    out.push('\n');
    if analysis.terms.is_empty() {
        out.push_str("Search terms tried: (none)\n");
    } else {
        let _ = writeln!(out, "Search terms tried: {}", analysis.terms.join(", "));
    }
    if !analysis.entity_candidates.is_empty() {
        let _ = writeln!(out, "Entity names tried: {}", analysis.entity_candidates.join(", "));
    }
    let mut filters = Vec::new();
    if let Some(ft) = &request.file_type_filter {
        filters.push(format!("file type = {ft}"));
    }
    if let Some(dir) = &request.directory_filter {
        filters.push(format!("directory = {dir}"));
    }
    if filters.is_empty() {
        out.push_str("Filters applied: none\n");
    } else {
        let _ = writeln!(out, "Filters applied: {}", filters.join("; "));
    }
    let _ = writeln!(out, "Files scanned: {}", outcome.files_scanned);

    out.push_str("\nSuggestions:\n");
    out.push_str("- Broaden the query or use fewer, more general terms.\n");
    if !filters.is_empty() {
        out.push_str("- Remove the file type or directory filter.\n");
    }
    for candidate in &analysis.entity_candidates {
        if let Some(base) = base_name(candidate) {
            let _ = writeln!(out, "- Try the base entity name `{base}` instead of `{candidate}`.");
        }
    }
    if let Some(dir) = &request.directory_filter {
        let _ = writeln!(out, "- Check that the directory `{dir}` exists under the project root.");
    }
    for path in &analysis.path_mentions {
        let _ = writeln!(out, "- Check the path `{path}`; it could not be verified on disk.");
    }
    if analysis.entity_candidates.is_empty() {
        out.push_str("- Name the function, class or component you are looking for, e.g. `UserCard`.\n");
    }

    out.push('\n');
    out.push_str(&summary_line(&outcome.summary));
    out
}

/// Footer appended to a model answer after checking the paths it cites.
pub fn claim_check_footer(claims: &[SearchResult]) -> Option<String> {
    if claims.is_empty() {
        return None;
    }
    let missing: Vec<&SearchResult> = claims.iter().filter(|c| !c.verification.file_exists).collect();
    let mut out = String::new();
    if missing.is_empty() {
        let _ = write!(out, "Claim check: all {} referenced path(s) exist.", claims.len());
    } else {
        let _ = writeln!(
            out,
            "Claim check: {} of {} referenced path(s) do not exist and may be fabricated:",
            missing.len(),
            claims.len()
        );
        for claim in missing {
            let _ = writeln!(out, "- NOT FOUND: {}", claim.file_path);
        }
    }
    Some(out.trim_end().to_string())
}

fn render_result(out: &mut String, result: &SearchResult) {
    let _ = writeln!(out, "Path: {}", result.file_path);
    let _ = writeln!(
        out,
        "Match: {} (confidence {:.2})",
        result.match_type.as_str(),
        result.confidence_score
    );
    for caveat in caveats(result) {
        let _ = writeln!(out, "Caveat: {caveat}");
    }

    for chunk in &result.chunks {
        out.push('\n');
        let _ = writeln!(
            out,
            "{CHUNK_RULE}\n{} `{}` (lines {}-{})",
            chunk.kind.as_str(),
            chunk.name,
            chunk.start_line,
            chunk.end_line
        );
        if !chunk.metadata.signature.is_empty() {
            let _ = writeln!(out, "Signature: {}", chunk.metadata.signature);
        }
        if let Some(doc) = &chunk.metadata.documentation {
            let _ = writeln!(out, "Docs: {}", doc.lines().next().unwrap_or_default());
        }
        let _ = writeln!(out, "```{}", chunk.metadata.language);
        out.push_str(chunk.content.trim_end_matches('\n'));
        out.push_str("\n```\n");

        let analysis = analysis_lines(chunk);
        if !analysis.is_empty() {
            out.push_str("Analysis:\n");
            for line in analysis {
                let _ = writeln!(out, "- {line}");
            }
        }
    }
}

fn caveats(result: &SearchResult) -> Vec<String> {
    let mut notes = Vec::new();
    match result.match_type {
        MatchType::Exact => {}
        MatchType::Partial => notes.push("partially verified; details may have changed".to_string()),
        MatchType::Inferred => notes.push("weakly verified; treat as a lead, not a fact".to_string()),
        MatchType::Synthetic => notes.push("could not be verified against the file".to_string()),
    }
    notes.extend(result.verification.discrepancies.iter().cloned());
    notes
}

fn analysis_lines(chunk: &CodeChunk) -> Vec<String> {
    let rel = &chunk.metadata.relationship_context;
    let mut lines = Vec::new();
    if chunk.metadata.is_exported {
        if rel.exports.is_empty() {
            lines.push("Exported".to_string());
        } else {
            lines.push(format!("Exported as: {}", rel.exports.join(", ")));
        }
    }
    if let Some(parent) = &chunk.metadata.parent_name {
        lines.push(format!("Member of: {parent}"));
    }
    let lists = [
        ("Imports from", &rel.imports),
        ("Extends", &rel.extends_from),
        ("Extended by", &rel.extended_by),
        ("Used by", &rel.used_by_entities),
        ("Related", &rel.related_entities),
        ("Imported by", &rel.imported_by),
        ("Used in importing files by", &rel.exports_to),
    ];
    for (label, items) in lists {
        if !items.is_empty() {
            lines.push(format!("{label}: {}", items.join(", ")));
        }
    }
    for edge in &rel.inferred {
        lines.push(format!(
            "Possibly {} {} (inferred: {}, distance {})",
            edge.relation, edge.target, edge.reason, edge.distance
        ));
    }
    if let Some(def) = &chunk.metadata.type_definition {
        if let Some(link) = &def.contract_for {
            let status = if link.verified { "verified" } else { "inferred" };
            lines.push(format!("Props contract for {} ({status})", link.entity));
        }
        if !def.properties.is_empty() {
            lines.push(format!("Properties: {}", members(&def.properties)));
        }
        if !def.methods.is_empty() {
            lines.push(format!("Methods: {}", members(&def.methods)));
        }
    }
    lines
}

fn members(children: &[ChildEntity]) -> String {
    children
        .iter()
        .map(|c| {
            let optional = if c.optional { "?" } else { "" };
            format!("{}{optional}: {}", c.name, c.type_name)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Cross-file section: props pairings and import edges.
fn relationship_lines(results: &[SearchResult]) -> Vec<String> {
    let mut lines = Vec::new();
    for result in results {
        for chunk in &result.chunks {
            if let Some(link) = chunk
                .metadata
                .type_definition
                .as_ref()
                .and_then(|d| d.contract_for.as_ref())
            {
                let status = if link.verified { "verified" } else { "inferred" };
                lines.push(format!("{} -> {} (props, {status})", chunk.name, link.entity));
            }
            for importer in &chunk.metadata.relationship_context.imported_by {
                lines.push(format!(
                    "{importer} imports {} from {}",
                    chunk.name, result.file_path
                ));
            }
            for base in &chunk.metadata.relationship_context.extends_from {
                lines.push(format!("{} extends {base}", chunk.name));
            }
        }
    }
    let mut seen = std::collections::HashSet::new();
    lines.retain(|l| seen.insert(l.clone()));
    lines
}

fn summary_line(summary: &VerificationSummary) -> String {
    let mut line = format!(
        "Verification summary: {} fully verified, {} structurally mismatched, {} not found",
        summary.fully_verified, summary.structural_mismatch, summary.not_found
    );
    if summary.dropped > 0 {
        let _ = write!(line, " ({} dropped)", summary.dropped);
    }
    line
}

fn base_name(candidate: &str) -> Option<String> {
    BASE_NAME_SUFFIXES.iter().find_map(|suffix| {
        candidate
            .strip_suffix(suffix)
            .filter(|base| !base.is_empty())
            .map(|base| {
                BASE_NAME_SUFFIXES
                    .iter()
                    .find_map(|s| base.strip_suffix(s).filter(|b| !b.is_empty()))
                    .unwrap_or(base)
                    .to_string()
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{ChunkKind, ChunkMetadata, ContractLink, TypeDefinition};
    use crate::extractor::ChildKind;
    use crate::models::ResultOrigin;
    use crate::ranker::query::analyze;
    use crate::search::SearchRequest;

    fn outcome(text: &str, results: Vec<SearchResult>) -> SearchOutcome {
        SearchOutcome {
            request: SearchRequest::new(text),
            analysis: analyze(text),
            results,
            summary: VerificationSummary {
                fully_verified: 1,
                structural_mismatch: 0,
                not_found: 1,
                dropped: 1,
            },
            files_scanned: 4,
            show_relationships: true,
        }
    }

    fn widget_result() -> SearchResult {
        let mut result = SearchResult::new("src/Widget.tsx", "", ResultOrigin::Retrieved);
        result.match_type = MatchType::Exact;
        result.confidence_score = 1.0;
        let mut props = CodeChunk {
            content: "interface WidgetProps {\n  label: string;\n}".to_string(),
            start_line: 1,
            end_line: 3,
            kind: ChunkKind::Interface,
            name: "WidgetProps".to_string(),
            file_path: "src/Widget.tsx".to_string(),
            metadata: ChunkMetadata {
                language: "tsx".to_string(),
                type_definition: Some(TypeDefinition {
                    properties: vec![ChildEntity {
                        name: "label".to_string(),
                        type_name: "string".to_string(),
                        kind: ChildKind::Property,
                        optional: false,
                    }],
                    methods: Vec::new(),
                    contract_for: Some(ContractLink {
                        entity: "Widget".to_string(),
                        verified: true,
                    }),
                }),
                ..ChunkMetadata::default()
            },
        };
        props.metadata.relationship_context.used_by_entities = vec!["Widget".to_string()];
        result.chunks = vec![props];
        result
    }

    #[test]
    fn test_render_blocks() {
        let text = render(&outcome("find WidgetProps", vec![widget_result()]));
        assert!(text.starts_with("Found 1 verified result(s) for \"find WidgetProps\" (4 files scanned)"));
        assert!(text.contains("Path: src/Widget.tsx\nMatch: exact (confidence 1.00)"));
        assert!(text.contains("interface `WidgetProps` (lines 1-3)"));
        assert!(text.contains("```tsx\ninterface WidgetProps {"));
        assert!(text.contains("- Used by: Widget"));
        assert!(text.contains("- Properties: label: string"));
        assert!(text.contains("Relationships:\n- WidgetProps -> Widget (props, verified)"));
        assert!(text.ends_with(
            "Verification summary: 1 fully verified, 0 structurally mismatched, 1 not found (1 dropped)"
        ));
    }

    #[test]
    fn test_no_results_suggestions() {
        let mut o = outcome("where is LoginFormProps in src/auth/Login.tsx", Vec::new());
        o.request.directory_filter = Some("src/auth".to_string());
        let text = render_no_results(&o);
        assert!(text.contains("Search terms tried: loginformprops"));
        assert!(text.contains("Filters applied: directory = src/auth"));
        assert!(text.contains("Try the base entity name `Login` instead of `LoginFormProps`"));
        assert!(text.contains("Check that the directory `src/auth` exists"));
        assert!(text.contains("Check the path `src/auth/Login.tsx`"));
    }

    #[test]
    fn test_claim_check_footer() {
        let mut ok = SearchResult::new("src/a.ts", "", ResultOrigin::Synthetic);
        ok.verification.file_exists = true;
        let missing = SearchResult::new("src/ghost.ts", "", ResultOrigin::Synthetic);

        assert_eq!(
            claim_check_footer(&[ok.clone()]).as_deref(),
            Some("Claim check: all 1 referenced path(s) exist.")
        );
        let footer = claim_check_footer(&[ok, missing]).unwrap();
        assert!(footer.contains("1 of 2 referenced path(s) do not exist"));
        assert!(footer.ends_with("- NOT FOUND: src/ghost.ts"));
        assert!(claim_check_footer(&[]).is_none());
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("LoginFormProps").as_deref(), Some("Login"));
        assert_eq!(base_name("WidgetProps").as_deref(), Some("Widget"));
        assert_eq!(base_name("Widget"), None);
    }
}
