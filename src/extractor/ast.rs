use super::languages::LanguageConfig;
use super::{EntityKind, ExtractError, SourceEntity, StructuralParser};
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, StreamingIterator};

/// Query-driven parser for TypeScript, TSX and JavaScript.
///
/// A tree that contains `ERROR` nodes is reported as a parse failure so the
/// extractor can hand the file to the regex scanner instead of trusting a
/// partially recovered tree.
pub struct TreeSitterParser {
    queries: HashMap<&'static str, (Language, Query)>,
}

impl TreeSitterParser {
    pub fn new() -> Result<Self, ExtractError> {
        let mut queries = HashMap::new();
        for config in LanguageConfig::get_all() {
            let query = Query::new(&config.language, config.query)
                .map_err(|e| ExtractError::Query(format!("{}: {e}", config.name)))?;
            queries.insert(config.name, (config.language, query));
        }
        Ok(Self { queries })
    }
}

impl StructuralParser for TreeSitterParser {
    fn name(&self) -> &'static str {
        "tree-sitter"
    }

    fn parse(&self, file_path: &Path, text: &str) -> Result<Vec<SourceEntity>, ExtractError> {
        let ext = file_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let config = LanguageConfig::get_by_extension(ext)
            .ok_or_else(|| ExtractError::Unsupported(ext.to_string()))?;
        let (language, query) = self
            .queries
            .get(config.name)
            .ok_or_else(|| ExtractError::Unsupported(config.name.to_string()))?;

        let mut parser = Parser::new();
        parser
            .set_language(language)
            .map_err(|e| ExtractError::Parse(e.to_string()))?;
        let source = text.as_bytes();
        let tree = parser
            .parse(source, None)
            .ok_or_else(|| ExtractError::Parse("parser returned no tree".to_string()))?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(ExtractError::Parse(format!(
                "syntax errors in {}",
                file_path.display()
            )));
        }

        Ok(extract_entities(root, source, query))
    }
}

fn capture_kind(capture_name: &str) -> Option<EntityKind> {
    match capture_name {
        "function" => Some(EntityKind::Function),
        "variable" => Some(EntityKind::Variable),
        "class" => Some(EntityKind::Class),
        "interface" => Some(EntityKind::Interface),
        "type" => Some(EntityKind::TypeAlias),
        "method" => Some(EntityKind::Method),
        _ => None,
    }
}

/// Lower wins when two patterns capture the same node.
fn priority(kind: EntityKind) -> u8 {
    match kind {
        EntityKind::Variable => 1,
        _ => 0,
    }
}

fn extract_entities(root: Node, source: &[u8], query: &Query) -> Vec<SourceEntity> {
    let mut cursor = QueryCursor::new();
    let mut entities: Vec<SourceEntity> = Vec::new();
    let mut seen: HashMap<(usize, usize), (usize, u8)> = HashMap::new();

    let mut matches = cursor.matches(query, root, source);
    while let Some(m) = matches.next() {
        let mut main_node = None;
        let mut kind = None;
        let mut name = String::new();

        for cap in m.captures {
            let capture_name = query.capture_names()[cap.index as usize];
            if capture_name == "name" {
                if let Ok(text) = cap.node.utf8_text(source) {
                    name = text.to_string();
                }
            } else if let Some(k) = capture_kind(capture_name) {
                main_node = Some(cap.node);
                kind = Some(k);
            }
        }

        let (Some(node), Some(kind)) = (main_node, kind) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        let parent_kind = node.parent().map(|p| p.kind());
        let parent_name = if kind == EntityKind::Method {
            match find_parent_symbol(node, source) {
                Some(p) => Some(p),
                // object-literal methods are not addressable entities
                None => continue,
            }
        } else {
            if !matches!(parent_kind, Some("program") | Some("export_statement")) {
                continue;
            }
            None
        };

        let exported = parent_kind == Some("export_statement");
        let outer = if exported {
            node.parent().unwrap_or(node)
        } else {
            node
        };

        let key = (node.start_byte(), node.end_byte());
        let rank = priority(kind);
        if let Some(&(idx, existing)) = seen.get(&key) {
            if rank < existing {
                entities[idx].kind = kind;
                seen.insert(key, (idx, rank));
            }
            continue;
        }

        let mut entity = SourceEntity::new(
            kind,
            name,
            outer.start_position().row + 1,
            outer.end_position().row + 1,
        );
        entity.parent_name = parent_name;
        entity.is_exported = exported;

        seen.insert(key, (entities.len(), rank));
        entities.push(entity);
    }

    entities.sort_by_key(|e| (e.start_line, e.end_line));
    entities
}

fn find_parent_symbol(node: Node, source: &[u8]) -> Option<String> {
    let mut parent = node.parent();
    while let Some(p) = parent {
        let kind = p.kind();
        if kind == "class_declaration" || kind == "abstract_class_declaration" || kind == "class" {
            return p
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source).ok())
                .map(|s| s.to_string());
        }
        if kind == "object" {
            return None;
        }
        parent = p.parent();
    }
    None
}
