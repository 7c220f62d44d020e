//! Structural entity extraction.
//!
//! [`EntityExtractor::extract`] turns one file's text into [`SourceEntity`]
//! records plus the file's [`DependencyInfo`]. It tries the tree-sitter
//! backed [`ast::TreeSitterParser`] first and degrades to the
//! brace-counting [`scanner::RegexScanner`] on any failure, so callers always
//! get a best-effort entity list.
pub mod ast;
pub mod deps;
pub mod enrich;
pub mod languages;
pub mod scanner;

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use self::ast::TreeSitterParser;
use self::scanner::RegexScanner;

/// Kind of structural unit found in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    Function,
    Class,
    Method,
    Interface,
    TypeAlias,
    Variable,
    UiComponent,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Function => "function",
            EntityKind::Class => "class",
            EntityKind::Method => "method",
            EntityKind::Interface => "interface",
            EntityKind::TypeAlias => "type-alias",
            EntityKind::Variable => "variable",
            EntityKind::UiComponent => "ui-component",
        }
    }

    /// Interfaces and type aliases describe a shape other entities consume.
    pub fn is_type_contract(&self) -> bool {
        matches!(self, EntityKind::Interface | EntityKind::TypeAlias)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildKind {
    Property,
    Method,
}

/// A member of an interface or object type (`name: type`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub kind: ChildKind,
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntity {
    pub kind: EntityKind,
    pub name: String,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
    pub parent_name: Option<String>,
    /// Heritage for classes and type contracts, referenced types for functions.
    pub dependencies: Vec<String>,
    pub documentation: Option<String>,
    pub is_exported: bool,
    pub child_entities: Vec<ChildEntity>,
}

impl SourceEntity {
    pub fn new(kind: EntityKind, name: impl Into<String>, start_line: usize, end_line: usize) -> Self {
        Self {
            kind,
            name: name.into(),
            start_line,
            end_line: end_line.max(start_line),
            parent_name: None,
            dependencies: Vec::new(),
            documentation: None,
            is_exported: false,
            child_entities: Vec::new(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub source: String,
    pub imported_names: Vec<String>,
    pub is_default: bool,
    pub line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    /// Name visible to importers.
    pub exported_name: String,
    /// Name of the declaration inside this file.
    pub local_name: String,
    pub is_default: bool,
    pub line: usize,
}

/// Per-file import/export table, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub imports: Vec<ImportRecord>,
    pub exports: Vec<ExportRecord>,
}

impl DependencyInfo {
    pub fn exports_local(&self, name: &str) -> bool {
        self.exports.iter().any(|e| e.local_name == name)
    }

    pub fn imports_name(&self, name: &str) -> bool {
        self.imports
            .iter()
            .any(|i| i.imported_names.iter().any(|n| n == name))
    }
}

/// Errors raised by a structural parser. They never leave [`EntityExtractor`].
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported file type: {0}")]
    Unsupported(String),

    #[error("parse failed: {0}")]
    Parse(String),

    #[error("query compilation failed: {0}")]
    Query(String),
}

/// A strategy that recognises top-level entities in one file.
///
/// Implementations report kind, name, line range, parent and syntactic export
/// status; documentation, heritage, members and component detection are
/// filled in afterwards by [`enrich::finish`].
pub trait StructuralParser: Send + Sync {
    fn name(&self) -> &'static str;

    fn parse(&self, file_path: &Path, text: &str) -> Result<Vec<SourceEntity>, ExtractError>;
}

/// Output of one extraction call.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub entities: Vec<SourceEntity>,
    pub dependencies: DependencyInfo,
    pub parser: &'static str,
}

pub struct EntityExtractor {
    primary: Option<Box<dyn StructuralParser>>,
    fallback: RegexScanner,
}

impl Default for EntityExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityExtractor {
    /// Tree-sitter first, regex scanner as fallback.
    pub fn new() -> Self {
        let primary = match TreeSitterParser::new() {
            Ok(p) => Some(Box::new(p) as Box<dyn StructuralParser>),
            Err(e) => {
                warn!("tree-sitter parser unavailable, using regex scanner only: {e}");
                None
            }
        };
        Self {
            primary,
            fallback: RegexScanner::new(),
        }
    }

    pub fn with_parser(primary: Box<dyn StructuralParser>) -> Self {
        Self {
            primary: Some(primary),
            fallback: RegexScanner::new(),
        }
    }

    /// Regex scanner only.
    pub fn fallback_only() -> Self {
        Self {
            primary: None,
            fallback: RegexScanner::new(),
        }
    }

    /// Extract entities and the import/export table. Never fails.
    pub fn extract(&self, file_path: &Path, text: &str) -> Extraction {
        let dependencies = deps::scan_dependencies(text);

        let (raw, parser) = match &self.primary {
            Some(primary) => match primary.parse(file_path, text) {
                Ok(entities) => (entities, primary.name()),
                Err(e) => {
                    debug!(
                        "{} failed on {}: {e}; falling back to {}",
                        primary.name(),
                        file_path.display(),
                        self.fallback.name()
                    );
                    (self.fallback.scan(text), self.fallback.name())
                }
            },
            None => (self.fallback.scan(text), self.fallback.name()),
        };

        let entities = enrich::finish(raw, text, &dependencies);
        Extraction {
            entities,
            dependencies,
            parser,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingParser;

    impl StructuralParser for FailingParser {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn parse(&self, _: &Path, _: &str) -> Result<Vec<SourceEntity>, ExtractError> {
            Err(ExtractError::Parse("boom".to_string()))
        }
    }

    const SAMPLE: &str = r#"import React from 'react';

/** Props for the widget. */
export interface WidgetProps {
  title: string;
  count?: number;
}

export function Widget({ title }: WidgetProps) {
  return <div>{title}</div>;
}
"#;

    #[test]
    fn test_extract_uses_tree_sitter_for_tsx() {
        let extractor = EntityExtractor::new();
        let out = extractor.extract(Path::new("Widget.tsx"), SAMPLE);

        assert_eq!(out.parser, "tree-sitter");
        let widget = out.entities.iter().find(|e| e.name == "Widget").unwrap();
        assert_eq!(widget.kind, EntityKind::UiComponent);
        assert!(widget.is_exported);

        let props = out.entities.iter().find(|e| e.name == "WidgetProps").unwrap();
        assert_eq!(props.kind, EntityKind::Interface);
        assert_eq!(props.documentation.as_deref(), Some("Props for the widget."));
        assert_eq!(props.child_entities.len(), 2);

        assert_eq!(out.dependencies.imports.len(), 1);
        assert_eq!(out.dependencies.imports[0].source, "react");
    }

    #[test]
    fn test_extract_falls_back_on_parser_error() {
        let extractor = EntityExtractor::with_parser(Box::new(FailingParser));
        let out = extractor.extract(Path::new("Widget.tsx"), SAMPLE);

        assert_eq!(out.parser, "regex-scanner");
        let names: Vec<&str> = out.entities.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"Widget"));
        assert!(names.contains(&"WidgetProps"));
    }

    #[test]
    fn test_extract_unknown_extension_still_yields_entities() {
        let extractor = EntityExtractor::new();
        let out = extractor.extract(
            Path::new("service.kt2"),
            "class Service {\n  start() {\n    run();\n  }\n}\n",
        );
        assert_eq!(out.parser, "regex-scanner");
        assert!(out.entities.iter().any(|e| e.name == "Service"));
        assert!(
            out.entities
                .iter()
                .any(|e| e.name == "start" && e.parent_name.as_deref() == Some("Service"))
        );
    }

    #[test]
    fn test_extract_empty_file() {
        let extractor = EntityExtractor::new();
        let out = extractor.extract(Path::new("empty.ts"), "// nothing here\n");
        assert!(out.entities.is_empty());
    }
}
