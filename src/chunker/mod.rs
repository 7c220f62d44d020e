//! Chunking: one renderable unit per extracted entity.
//!
//! A [`CodeChunk`] carries the entity's own lines padded with
//! `context_lines` on each side, plus metadata the ranker, verifier and
//! report writer read: language, parent, documentation, export status,
//! signature, member lists for type contracts and a [`RelationshipContext`]
//! that [`relations::connect_relationships`] fills in across files.
pub mod relations;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::extractor::languages::language_for_extension;
use crate::extractor::{
    ChildEntity, ChildKind, DependencyInfo, EntityExtractor, EntityKind, SourceEntity,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkKind {
    Function,
    Class,
    Method,
    Interface,
    TypeAlias,
    Variable,
    UiComponent,
    Imports,
    File,
}

impl From<EntityKind> for ChunkKind {
    fn from(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Function => ChunkKind::Function,
            EntityKind::Class => ChunkKind::Class,
            EntityKind::Method => ChunkKind::Method,
            EntityKind::Interface => ChunkKind::Interface,
            EntityKind::TypeAlias => ChunkKind::TypeAlias,
            EntityKind::Variable => ChunkKind::Variable,
            EntityKind::UiComponent => ChunkKind::UiComponent,
        }
    }
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Class => "class",
            ChunkKind::Method => "method",
            ChunkKind::Interface => "interface",
            ChunkKind::TypeAlias => "type-alias",
            ChunkKind::Variable => "variable",
            ChunkKind::UiComponent => "ui-component",
            ChunkKind::Imports => "imports",
            ChunkKind::File => "file",
        }
    }

    pub fn is_type_contract(&self) -> bool {
        matches!(self, ChunkKind::Interface | ChunkKind::TypeAlias)
    }

    /// Functions, classes and components share one verification category.
    pub fn is_code_entity(&self) -> bool {
        matches!(
            self,
            ChunkKind::Function | ChunkKind::Class | ChunkKind::UiComponent
        )
    }

    /// Chunks that name an addressable entity.
    pub fn is_entity(&self) -> bool {
        !matches!(self, ChunkKind::Imports | ChunkKind::File)
    }

    /// Display order inside one file, lower first.
    pub fn importance(&self) -> u8 {
        match self {
            ChunkKind::UiComponent => 0,
            ChunkKind::Class => 1,
            ChunkKind::Interface => 2,
            ChunkKind::TypeAlias => 3,
            ChunkKind::Function => 4,
            ChunkKind::Variable => 5,
            ChunkKind::Method => 6,
            ChunkKind::Imports => 7,
            ChunkKind::File => 8,
        }
    }
}

/// A naming-convention guess, kept apart from literal edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredEdge {
    /// `used-by` or `related`.
    pub relation: String,
    pub target: String,
    pub reason: String,
    /// Edit distance between the stripped contract name and the target.
    pub distance: usize,
}

/// Cross-entity edges. Everything outside `inferred` is backed by literal
/// text in the source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipContext {
    /// Module specifiers this chunk uses names from.
    pub imports: Vec<String>,
    /// Names under which this entity is exported.
    pub exports: Vec<String>,
    /// Files that import this entity by name.
    pub imported_by: Vec<String>,
    /// Entities in importing files that use this entity.
    pub exports_to: Vec<String>,
    pub related_entities: Vec<String>,
    pub used_by_entities: Vec<String>,
    pub extends_from: Vec<String>,
    pub extended_by: Vec<String>,
    pub inferred: Vec<InferredEdge>,
}

impl RelationshipContext {
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
            && self.exports.is_empty()
            && self.imported_by.is_empty()
            && self.exports_to.is_empty()
            && self.related_entities.is_empty()
            && self.used_by_entities.is_empty()
            && self.extends_from.is_empty()
            && self.extended_by.is_empty()
            && self.inferred.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractLink {
    pub entity: String,
    pub verified: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub properties: Vec<ChildEntity>,
    pub methods: Vec<ChildEntity>,
    /// Set when this contract describes the props of a component.
    pub contract_for: Option<ContractLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub language: String,
    pub parent_name: Option<String>,
    pub documentation: Option<String>,
    pub is_exported: bool,
    pub signature: String,
    /// Heritage and referenced type names from the entity.
    pub dependencies: Vec<String>,
    pub relationship_context: RelationshipContext,
    pub type_definition: Option<TypeDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChunk {
    /// Entity lines plus surrounding context.
    pub content: String,
    /// 1-based entity range, context excluded.
    pub start_line: usize,
    pub end_line: usize,
    pub kind: ChunkKind,
    pub name: String,
    pub file_path: String,
    pub metadata: ChunkMetadata,
}

impl CodeChunk {
    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// Every chunk of one file with the extraction it came from.
#[derive(Debug, Clone)]
pub struct ChunkedFile {
    pub path: String,
    pub content: String,
    pub chunks: Vec<CodeChunk>,
    pub entities: Vec<SourceEntity>,
    pub dependencies: DependencyInfo,
}

pub struct Chunker {
    extractor: Arc<EntityExtractor>,
    context_lines: usize,
}

impl Chunker {
    pub fn new(extractor: Arc<EntityExtractor>, context_lines: usize) -> Self {
        Self {
            extractor,
            context_lines,
        }
    }

    pub fn build_chunks(&self, file_path: &str, text: &str) -> ChunkedFile {
        let extraction = self.extractor.extract(Path::new(file_path), text);
        let language = Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(language_for_extension)
            .unwrap_or("text")
            .to_string();
        let lines: Vec<&str> = text.lines().collect();
        let deps = &extraction.dependencies;

        let mut chunks = Vec::new();

        if extraction.entities.is_empty() {
            let stem = Path::new(file_path)
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(file_path);
            chunks.push(CodeChunk {
                content: text.to_string(),
                start_line: 1,
                end_line: lines.len().max(1),
                kind: ChunkKind::File,
                name: stem.to_string(),
                file_path: file_path.to_string(),
                metadata: ChunkMetadata {
                    language,
                    relationship_context: RelationshipContext {
                        imports: deps.imports.iter().map(|i| i.source.clone()).collect(),
                        exports: deps.exports.iter().map(|e| e.exported_name.clone()).collect(),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            });
        } else {
            let first_entity = extraction
                .entities
                .iter()
                .map(|e| e.start_line)
                .min()
                .unwrap_or(usize::MAX);
            if let Some((start, end)) = import_block(&lines, deps) {
                if end < first_entity {
                    chunks.push(self.imports_chunk(file_path, &lines, deps, start, end, &language));
                }
            }
            for entity in &extraction.entities {
                chunks.push(self.entity_chunk(file_path, &lines, deps, entity, &language));
            }
        }

        ChunkedFile {
            path: file_path.to_string(),
            content: text.to_string(),
            chunks,
            entities: extraction.entities,
            dependencies: extraction.dependencies,
        }
    }

    fn imports_chunk(
        &self,
        file_path: &str,
        lines: &[&str],
        deps: &DependencyInfo,
        start: usize,
        end: usize,
        language: &str,
    ) -> CodeChunk {
        let sources = deps
            .imports
            .iter()
            .filter(|i| i.line >= start && i.line <= end)
            .map(|i| i.source.clone())
            .collect();
        CodeChunk {
            content: lines[start - 1..end].join("\n"),
            start_line: start,
            end_line: end,
            kind: ChunkKind::Imports,
            name: "imports".to_string(),
            file_path: file_path.to_string(),
            metadata: ChunkMetadata {
                language: language.to_string(),
                relationship_context: RelationshipContext {
                    imports: sources,
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    fn entity_chunk(
        &self,
        file_path: &str,
        lines: &[&str],
        deps: &DependencyInfo,
        entity: &SourceEntity,
        language: &str,
    ) -> CodeChunk {
        let last = lines.len().max(1);
        let end_line = entity.end_line.min(last);
        let own = if lines.is_empty() {
            String::new()
        } else {
            lines[entity.start_line - 1..end_line].join("\n")
        };
        let from = entity.start_line.saturating_sub(self.context_lines).max(1);
        let to = (end_line + self.context_lines).min(lines.len());
        let content = if lines.is_empty() {
            String::new()
        } else {
            lines[from - 1..to.max(from)].join("\n")
        };

        let kind = ChunkKind::from(entity.kind);

        let mut rel = RelationshipContext::default();
        for import in &deps.imports {
            if import.imported_names.iter().any(|n| contains_word(&own, n)) {
                push_unique(&mut rel.imports, &import.source);
            }
        }
        if entity.parent_name.is_none() {
            for export in deps.exports.iter().filter(|e| e.local_name == entity.name) {
                push_unique(&mut rel.exports, &export.exported_name);
            }
            if entity.is_exported && rel.exports.is_empty() {
                rel.exports.push(entity.name.clone());
            }
        }
        match entity.kind {
            EntityKind::Interface => rel.extends_from = entity.dependencies.clone(),
            EntityKind::Class | EntityKind::UiComponent => {
                let header = extract_signature(&own);
                for dep in &entity.dependencies {
                    if header.contains(&format!("extends {dep}")) {
                        push_unique(&mut rel.extends_from, dep);
                    }
                }
            }
            _ => {}
        }

        let type_definition = kind.is_type_contract().then(|| TypeDefinition {
            properties: entity
                .child_entities
                .iter()
                .filter(|c| c.kind == ChildKind::Property)
                .cloned()
                .collect(),
            methods: entity
                .child_entities
                .iter()
                .filter(|c| c.kind == ChildKind::Method)
                .cloned()
                .collect(),
            contract_for: None,
        });

        CodeChunk {
            content,
            start_line: entity.start_line,
            end_line,
            kind,
            name: entity.name.clone(),
            file_path: file_path.to_string(),
            metadata: ChunkMetadata {
                language: language.to_string(),
                parent_name: entity.parent_name.clone(),
                documentation: entity.documentation.clone(),
                is_exported: entity.is_exported,
                signature: extract_signature(&own),
                dependencies: entity.dependencies.clone(),
                relationship_context: rel,
                type_definition,
            },
        }
    }
}

/// Line range of the contiguous import statements at the top of the file.
/// Blank lines, comments and directive strings may sit between them.
fn import_block(lines: &[&str], deps: &DependencyInfo) -> Option<(usize, usize)> {
    if deps.imports.is_empty() {
        return None;
    }
    let covered = |line: usize| {
        deps.imports
            .iter()
            .any(|i| line >= i.line && line <= i.end_line)
    };

    let mut start = None;
    let mut end = 0;
    let mut in_block_comment = false;
    for (idx, raw) in lines.iter().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();
        if in_block_comment {
            in_block_comment = !trimmed.contains("*/");
            continue;
        }
        if covered(line_no) {
            start.get_or_insert(line_no);
            end = line_no;
            continue;
        }
        if trimmed.is_empty()
            || trimmed.starts_with("//")
            || trimmed.starts_with("'use ")
            || trimmed.starts_with("\"use ")
        {
            continue;
        }
        if trimmed.starts_with("/*") {
            in_block_comment = !trimmed.contains("*/");
            continue;
        }
        break;
    }
    start.map(|s| (s, end))
}

/// Declaration header: text before the body brace or arrow, whitespace
/// collapsed.
pub fn extract_signature(content: &str) -> String {
    let content = content.trim();
    let mut parens = 0i32;
    let mut cut = None;
    let mut prev = ' ';
    for (idx, c) in content.char_indices() {
        match c {
            '(' | '[' => parens += 1,
            ')' | ']' => parens = (parens - 1).max(0),
            '{' if parens == 0 => {
                cut = Some(idx);
                break;
            }
            '>' if parens == 0 && prev == '=' => {
                cut = Some(idx + 1);
                break;
            }
            _ => {}
        }
        prev = c;
    }
    let sig = match cut {
        Some(idx) => &content[..idx],
        None => content.lines().next().unwrap_or(""),
    };
    sig.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `word` occurs in `text` delimited by non-identifier characters.
pub fn contains_word(text: &str, word: &str) -> bool {
    if word.is_empty() {
        return false;
    }
    let is_ident = |c: char| c.is_alphanumeric() || c == '_' || c == '$';
    text.match_indices(word).any(|(idx, _)| {
        let before = text[..idx].chars().next_back();
        let after = text[idx + word.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

pub(crate) fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(context_lines: usize) -> Chunker {
        Chunker::new(Arc::new(EntityExtractor::new()), context_lines)
    }

    const SOURCE: &str = r#"'use client';
import React from 'react';
import { formatDate } from './dates';

/** Props for the card. */
export interface CardProps {
  title: string;
  created: Date;
  onOpen(): void;
}

export function Card({ title, created }: CardProps) {
  return <div>{title} {formatDate(created)}</div>;
}

export class Base {}

export class Store extends Base {
  load() {
    return 1;
  }
}
"#;

    #[test]
    fn test_build_chunks() {
        let file = chunker(0).build_chunks("src/Card.tsx", SOURCE);
        let kinds: Vec<(ChunkKind, &str)> = file
            .chunks
            .iter()
            .map(|c| (c.kind, c.name.as_str()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ChunkKind::Imports, "imports"),
                (ChunkKind::Interface, "CardProps"),
                (ChunkKind::UiComponent, "Card"),
                (ChunkKind::Class, "Base"),
                (ChunkKind::Class, "Store"),
                (ChunkKind::Method, "load"),
            ]
        );

        let imports = &file.chunks[0];
        assert_eq!((imports.start_line, imports.end_line), (2, 3));
        assert_eq!(
            imports.metadata.relationship_context.imports,
            vec!["react", "./dates"]
        );

        let props = &file.chunks[1];
        assert_eq!(props.metadata.language, "tsx");
        assert_eq!(props.metadata.documentation.as_deref(), Some("Props for the card."));
        let def = props.metadata.type_definition.as_ref().unwrap();
        assert_eq!(def.properties.len(), 2);
        assert_eq!(def.methods.len(), 1);
        assert_eq!(props.metadata.relationship_context.exports, vec!["CardProps"]);

        let card = &file.chunks[2];
        assert_eq!(card.metadata.relationship_context.imports, vec!["./dates"]);
        assert_eq!(card.metadata.dependencies, vec!["CardProps"]);
        assert_eq!(card.metadata.signature, "export function Card({ title, created }: CardProps)");

        let store = &file.chunks[4];
        assert_eq!(store.metadata.relationship_context.extends_from, vec!["Base"]);
        assert_eq!(file.chunks[5].metadata.parent_name.as_deref(), Some("Store"));
    }

    #[test]
    fn test_context_lines_pad_content_only() {
        let file = chunker(1).build_chunks("src/Card.tsx", SOURCE);
        let card = file.chunks.iter().find(|c| c.name == "Card").unwrap();
        assert_eq!((card.start_line, card.end_line), (12, 14));
        assert!(card.content.starts_with('\n'));
        assert_eq!(card.content.split('\n').count(), 5);
    }

    #[test]
    fn test_file_without_entities_is_one_chunk() {
        let file = chunker(2).build_chunks("src/setup.js", "import './polyfills';\nrun();\n");
        assert_eq!(file.chunks.len(), 1);
        let chunk = &file.chunks[0];
        assert_eq!(chunk.kind, ChunkKind::File);
        assert_eq!(chunk.name, "setup");
        assert_eq!((chunk.start_line, chunk.end_line), (1, 2));
        assert_eq!(chunk.metadata.relationship_context.imports, vec!["./polyfills"]);
    }

    #[test]
    fn test_imports_chunk_only_before_first_entity() {
        let text = "export const a = 1;\nimport { b } from './b';\n";
        let file = chunker(0).build_chunks("src/late.ts", text);
        assert!(file.chunks.iter().all(|c| c.kind != ChunkKind::Imports));
    }

    #[test]
    fn test_contains_word() {
        assert!(contains_word("use CardProps here", "CardProps"));
        assert!(!contains_word("use CardPropsX here", "CardProps"));
        assert!(!contains_word("$Card", "Card"));
        assert!(contains_word("<Card/>", "Card"));
    }

    #[test]
    fn test_extract_signature() {
        assert_eq!(
            extract_signature("export const f = (a: number) =>\n  a * 2;"),
            "export const f = (a: number) =>"
        );
        assert_eq!(
            extract_signature("function g(cb: () => void) {\n}"),
            "function g(cb: () => void)"
        );
        assert_eq!(extract_signature("type A = string;"), "type A = string;");
    }
}
