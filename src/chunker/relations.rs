//! Cross-chunk relationship linking.
//!
//! Literal evidence (a name written in a signature, an import statement, a
//! heritage clause) produces plain edges. Naming-convention guesses such as
//! `LoginFormProps` → `Login` go to [`InferredEdge`] instead so consumers can
//! decide whether to trust them.
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::{
    ChunkKind, ChunkedFile, ContractLink, InferredEdge, RelationshipContext, contains_word,
    push_unique,
};
use crate::models::SearchResult;

const PROPS_SUFFIX: &str = "Props";

/// Suffixes stripped from a props base name when no exact component exists.
const VARIANT_SUFFIXES: &[&str] = &["FormFields", "Fields", "Form"];

/// (file index, chunk index)
type Location = (usize, usize);

enum Edge {
    UsedBy(String),
    Related(String),
    Inferred(InferredEdge),
    ContractFor(ContractLink),
    ImportedBy(String),
    ExportsTo(String),
    ExtendedBy(String),
}

/// Fill in relationship contexts across every chunk of `files`.
pub fn connect_relationships(files: &mut [ChunkedFile]) {
    let index = build_index(files);
    let mut edges: Vec<(Location, Edge)> = Vec::new();

    link_props(files, &index, &mut edges);
    link_type_references(files, &index, &mut edges);
    link_imports(files, &mut edges);
    link_heritage(files, &index, &mut edges);

    for ((fi, ci), edge) in edges {
        let chunk = &mut files[fi].chunks[ci];
        let rel = &mut chunk.metadata.relationship_context;
        match edge {
            Edge::UsedBy(name) => push_unique(&mut rel.used_by_entities, &name),
            Edge::Related(name) => push_unique(&mut rel.related_entities, &name),
            Edge::ImportedBy(path) => push_unique(&mut rel.imported_by, &path),
            Edge::ExportsTo(name) => push_unique(&mut rel.exports_to, &name),
            Edge::ExtendedBy(name) => push_unique(&mut rel.extended_by, &name),
            Edge::Inferred(edge) => {
                let known = rel
                    .inferred
                    .iter()
                    .any(|e| e.relation == edge.relation && e.target == edge.target);
                if !known {
                    rel.inferred.push(edge);
                }
            }
            Edge::ContractFor(link) => {
                if let Some(def) = chunk.metadata.type_definition.as_mut() {
                    let replace = match &def.contract_for {
                        None => true,
                        Some(existing) => !existing.verified && link.verified,
                    };
                    if replace {
                        def.contract_for = Some(link);
                    }
                }
            }
        }
    }
}

fn build_index(files: &[ChunkedFile]) -> HashMap<String, Vec<Location>> {
    let mut index: HashMap<String, Vec<Location>> = HashMap::new();
    for (fi, file) in files.iter().enumerate() {
        for (ci, chunk) in file.chunks.iter().enumerate() {
            if chunk.kind.is_entity() {
                index.entry(chunk.name.clone()).or_default().push((fi, ci));
            }
        }
    }
    index
}

fn is_consumer(kind: ChunkKind) -> bool {
    matches!(
        kind,
        ChunkKind::UiComponent | ChunkKind::Function | ChunkKind::Class | ChunkKind::Variable
    )
}

/// Matching locations for `name`, same-file matches first.
fn lookup(
    files: &[ChunkedFile],
    index: &HashMap<String, Vec<Location>>,
    name: &str,
    from_file: usize,
    accept: impl Fn(ChunkKind) -> bool,
) -> Vec<Location> {
    let mut found: Vec<Location> = index
        .get(name)
        .map(|locs| {
            locs.iter()
                .copied()
                .filter(|&(fi, ci)| accept(files[fi].chunks[ci].kind))
                .collect()
        })
        .unwrap_or_default();
    found.sort_by_key(|&(fi, ci)| (fi != from_file, fi, ci));
    found
}

fn link_props(files: &[ChunkedFile], index: &HashMap<String, Vec<Location>>, edges: &mut Vec<(Location, Edge)>) {
    for (fi, file) in files.iter().enumerate() {
        for (ci, chunk) in file.chunks.iter().enumerate() {
            if !chunk.kind.is_type_contract() {
                continue;
            }
            let Some(base) = chunk.name.strip_suffix(PROPS_SUFFIX) else {
                continue;
            };
            if base.is_empty() {
                continue;
            }

            if let Some(&target) = lookup(files, index, base, fi, is_consumer).first() {
                verified_contract(edges, (fi, ci), &chunk.name, target, base);
                continue;
            }

            let mut best: Option<(usize, bool, Location, String)> = None;
            for variant in props_variants(base) {
                for loc in lookup(files, index, &variant, fi, is_consumer) {
                    let distance = levenshtein(base, &variant);
                    let candidate = (distance, loc.0 != fi, loc, variant.clone());
                    let better = match &best {
                        None => true,
                        Some(current) => (candidate.0, candidate.1, candidate.2) < (current.0, current.1, current.2),
                    };
                    if better {
                        best = Some(candidate);
                    }
                }
            }

            let Some((distance, _, target, variant)) = best else {
                continue;
            };
            let component = &files[target.0].chunks[target.1];
            if contains_word(&component.content, &chunk.name) {
                verified_contract(edges, (fi, ci), &chunk.name, target, &variant);
            } else {
                let reason = format!("{} follows the props naming of {}", chunk.name, variant);
                edges.push((
                    (fi, ci),
                    Edge::Inferred(InferredEdge {
                        relation: "used-by".to_string(),
                        target: variant.clone(),
                        reason: reason.clone(),
                        distance,
                    }),
                ));
                edges.push((
                    (fi, ci),
                    Edge::ContractFor(ContractLink {
                        entity: variant,
                        verified: false,
                    }),
                ));
                edges.push((
                    target,
                    Edge::Inferred(InferredEdge {
                        relation: "related".to_string(),
                        target: chunk.name.clone(),
                        reason,
                        distance,
                    }),
                ));
            }
        }
    }
}

fn verified_contract(
    edges: &mut Vec<(Location, Edge)>,
    contract: Location,
    contract_name: &str,
    component: Location,
    component_name: &str,
) {
    edges.push((contract, Edge::UsedBy(component_name.to_string())));
    edges.push((
        contract,
        Edge::ContractFor(ContractLink {
            entity: component_name.to_string(),
            verified: true,
        }),
    ));
    edges.push((component, Edge::Related(contract_name.to_string())));
}

/// `LoginFormFields` → `LoginForm`, `Login`
fn props_variants(base: &str) -> Vec<String> {
    let mut variants = Vec::new();
    for suffix in VARIANT_SUFFIXES {
        if let Some(stripped) = base.strip_suffix(suffix) {
            if !stripped.is_empty() && !variants.iter().any(|v: &String| v == stripped) {
                variants.push(stripped.to_string());
            }
        }
    }
    variants
}

/// Types named in a consumer's signature are literal `used-by` evidence.
fn link_type_references(
    files: &[ChunkedFile],
    index: &HashMap<String, Vec<Location>>,
    edges: &mut Vec<(Location, Edge)>,
) {
    for (fi, file) in files.iter().enumerate() {
        for (ci, chunk) in file.chunks.iter().enumerate() {
            if !is_consumer(chunk.kind) && chunk.kind != ChunkKind::Method {
                continue;
            }
            for dep in &chunk.metadata.dependencies {
                let Some(&contract) = lookup(files, index, dep, fi, |k| k.is_type_contract()).first() else {
                    continue;
                };
                edges.push((contract, Edge::UsedBy(chunk.name.clone())));
                edges.push(((fi, ci), Edge::Related(dep.clone())));
                if dep.ends_with(PROPS_SUFFIX) && matches!(chunk.kind, ChunkKind::UiComponent | ChunkKind::Function) {
                    edges.push((
                        contract,
                        Edge::ContractFor(ContractLink {
                            entity: chunk.name.clone(),
                            verified: true,
                        }),
                    ));
                }
            }
        }
    }
}

/// Relative or aliased module specifiers; bare package names never point
/// into the scanned tree.
fn is_local_source(source: &str) -> bool {
    source.starts_with('.') || source.starts_with('/') || source.starts_with("@/") || source.starts_with("~/")
}

/// The specifier's last segment names the file or one of its directories.
fn source_may_resolve_to(source: &str, path: &str) -> bool {
    let segment = source.rsplit('/').next().unwrap_or(source);
    let segment = segment.split('.').next().unwrap_or(segment);
    if segment.is_empty() {
        return true;
    }
    let path = Path::new(path);
    let stem_matches = path.file_stem().and_then(|s| s.to_str()) == Some(segment);
    stem_matches
        || path
            .parent()
            .map(|p| p.iter().any(|c| c.to_str() == Some(segment)))
            .unwrap_or(false)
}

fn link_imports(files: &[ChunkedFile], edges: &mut Vec<(Location, Edge)>) {
    for (ai, exporter) in files.iter().enumerate() {
        for (ci, chunk) in exporter.chunks.iter().enumerate() {
            if !chunk.kind.is_entity() || !chunk.metadata.is_exported {
                continue;
            }
            let visible = &chunk.metadata.relationship_context.exports;
            for (bi, importer) in files.iter().enumerate() {
                if bi == ai {
                    continue;
                }
                let imported = importer.dependencies.imports.iter().any(|import| {
                    is_local_source(&import.source)
                        && source_may_resolve_to(&import.source, &exporter.path)
                        && import
                            .imported_names
                            .iter()
                            .any(|n| n == &chunk.name || visible.contains(n))
                });
                if !imported {
                    continue;
                }
                edges.push(((ai, ci), Edge::ImportedBy(importer.path.clone())));
                for user in importer.chunks.iter().filter(|c| c.kind.is_entity()) {
                    if contains_word(&user.content, &chunk.name) {
                        edges.push(((ai, ci), Edge::ExportsTo(user.name.clone())));
                    }
                }
            }
        }
    }
}

fn link_heritage(files: &[ChunkedFile], index: &HashMap<String, Vec<Location>>, edges: &mut Vec<(Location, Edge)>) {
    for (fi, file) in files.iter().enumerate() {
        for chunk in &file.chunks {
            for parent in &chunk.metadata.relationship_context.extends_from {
                let found = lookup(files, index, parent, fi, |k| k != ChunkKind::Method);
                if let Some(&loc) = found.first() {
                    edges.push((loc, Edge::ExtendedBy(chunk.name.clone())));
                }
            }
        }
    }
}

/// Drop edges whose target is not part of `results`.
///
/// Runs after verification and filtering so that no chunk asserts a link to
/// an entity or file the caller cannot see.
pub fn prune_relationships(results: &mut [SearchResult]) {
    let names: HashSet<String> = results
        .iter()
        .flat_map(|r| r.chunks.iter())
        .filter(|c| c.kind.is_entity())
        .map(|c| c.name.clone())
        .collect();
    let paths: HashSet<String> = results.iter().map(|r| r.file_path.clone()).collect();

    for chunk in results.iter_mut().flat_map(|r| r.chunks.iter_mut()) {
        let rel: &mut RelationshipContext = &mut chunk.metadata.relationship_context;
        rel.related_entities.retain(|n| names.contains(n));
        rel.used_by_entities.retain(|n| names.contains(n));
        rel.extends_from.retain(|n| names.contains(n));
        rel.extended_by.retain(|n| names.contains(n));
        rel.exports_to.retain(|n| names.contains(n));
        rel.imported_by.retain(|p| paths.contains(p));
        rel.inferred.retain(|e| names.contains(&e.target));

        if let Some(def) = chunk.metadata.type_definition.as_mut() {
            if def
                .contract_for
                .as_ref()
                .is_some_and(|link| !names.contains(&link.entity))
            {
                def.contract_for = None;
            }
        }
    }
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());
    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, val) in dp[0].iter_mut().enumerate() {
        *val = j;
    }
    for i in 1..=m {
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[m][n]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{Chunker, CodeChunk};
    use crate::extractor::EntityExtractor;
    use crate::models::ResultOrigin;
    use std::sync::Arc;

    fn chunk_files(sources: &[(&str, &str)]) -> Vec<ChunkedFile> {
        let chunker = Chunker::new(Arc::new(EntityExtractor::new()), 0);
        let mut files: Vec<ChunkedFile> = sources
            .iter()
            .map(|(path, text)| chunker.build_chunks(path, text))
            .collect();
        connect_relationships(&mut files);
        files
    }

    fn find<'a>(files: &'a [ChunkedFile], name: &str) -> &'a CodeChunk {
        files
            .iter()
            .flat_map(|f| f.chunks.iter())
            .find(|c| c.name == name)
            .unwrap()
    }

    #[test]
    fn test_props_linked_to_component_in_same_file() {
        let files = chunk_files(&[(
            "src/Widget.tsx",
            "export interface WidgetProps {\n  title: string;\n}\n\nexport function Widget({ title }: WidgetProps) {\n  return <div>{title}</div>;\n}\n",
        )]);
        let props = find(&files, "WidgetProps");
        assert_eq!(props.metadata.relationship_context.used_by_entities, vec!["Widget"]);
        assert_eq!(
            props.metadata.type_definition.as_ref().unwrap().contract_for,
            Some(ContractLink {
                entity: "Widget".to_string(),
                verified: true
            })
        );
        let widget = find(&files, "Widget");
        assert!(widget
            .metadata
            .relationship_context
            .related_entities
            .contains(&"WidgetProps".to_string()));
    }

    #[test]
    fn test_naming_variant_is_inferred_without_literal_use() {
        let files = chunk_files(&[(
            "src/Login.tsx",
            "export type LoginFormProps = {\n  user: string;\n};\n\nexport function Login() {\n  return <form />;\n}\n",
        )]);
        let props = find(&files, "LoginFormProps");
        let rel = &props.metadata.relationship_context;
        assert!(rel.used_by_entities.is_empty());
        assert_eq!(rel.inferred.len(), 1);
        assert_eq!(rel.inferred[0].target, "Login");
        assert_eq!(rel.inferred[0].distance, 4);
        assert_eq!(
            props.metadata.type_definition.as_ref().unwrap().contract_for,
            Some(ContractLink {
                entity: "Login".to_string(),
                verified: false
            })
        );

        let login = find(&files, "Login");
        assert!(login.metadata.relationship_context.related_entities.is_empty());
        assert_eq!(login.metadata.relationship_context.inferred[0].target, "LoginFormProps");
    }

    #[test]
    fn test_closest_variant_wins() {
        let files = chunk_files(&[(
            "src/Profile.tsx",
            "interface ProfileFormFieldsProps {\n  name: string;\n}\nfunction Profile() {\n  return <div />;\n}\nfunction ProfileForm() {\n  return <form />;\n}\n",
        )]);
        let props = find(&files, "ProfileFormFieldsProps");
        assert_eq!(props.metadata.relationship_context.inferred[0].target, "ProfileForm");
    }

    #[test]
    fn test_cross_file_imports() {
        let files = chunk_files(&[
            (
                "src/components/Button.tsx",
                "export function Button() {\n  return <button />;\n}\n",
            ),
            (
                "src/Toolbar.tsx",
                "import { Button } from './components/Button';\n\nexport function Toolbar() {\n  return <Button />;\n}\n",
            ),
            (
                "src/Other.tsx",
                "import { Button } from 'ui-kit';\n\nexport function Other() {\n  return <Button />;\n}\n",
            ),
        ]);
        let button = find(&files, "Button");
        let rel = &button.metadata.relationship_context;
        assert_eq!(rel.imported_by, vec!["src/Toolbar.tsx"]);
        assert_eq!(rel.exports_to, vec!["Toolbar"]);
    }

    #[test]
    fn test_extended_by_back_edge() {
        let files = chunk_files(&[
            ("src/base.ts", "export class Base {}\n"),
            ("src/child.ts", "import { Base } from './base';\n\nexport class Child extends Base {}\n"),
        ]);
        assert_eq!(
            find(&files, "Base").metadata.relationship_context.extended_by,
            vec!["Child"]
        );
        assert_eq!(
            find(&files, "Child").metadata.relationship_context.extends_from,
            vec!["Base"]
        );
    }

    #[test]
    fn test_prune_relationships() {
        let files = chunk_files(&[(
            "src/Widget.tsx",
            "export interface WidgetProps {\n  title: string;\n}\n\nexport function Widget({ title }: WidgetProps) {\n  return <div>{title}</div>;\n}\n",
        )]);
        let mut result = SearchResult::new("src/Widget.tsx", files[0].content.clone(), ResultOrigin::Retrieved);
        result.chunks = files[0]
            .chunks
            .iter()
            .filter(|c| c.name == "WidgetProps")
            .cloned()
            .collect();
        let mut results = vec![result];
        prune_relationships(&mut results);

        let props = &results[0].chunks[0];
        assert!(props.metadata.relationship_context.used_by_entities.is_empty());
        assert!(props.metadata.type_definition.as_ref().unwrap().contract_for.is_none());
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("LoginForm", "Login"), 4);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }
}
