//! Post-processing shared by both structural parsers.
//!
//! Parsers only report where an entity is. This pass reads the text around
//! it to attach leading documentation, heritage and referenced types,
//! interface/object-type members, UI-component classification and export
//! status resolved against the file's export table.
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::scanner::sanitize_lines;
use super::{ChildEntity, ChildKind, DependencyInfo, EntityKind, SourceEntity};

static JSX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:return|=>)\s*\(?\s*<[A-Za-z>]|</[A-Za-z][\w.]*>|<[A-Za-z][\w.]*[^<>]*/>")
        .expect("jsx regex is valid")
});
static COMPONENT_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:React\.)?(?:FC|FunctionComponent|VFC)\b|\bJSX\.Element\b|\bReactElement\b")
        .expect("component type regex is valid")
});
static EXTENDS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bextends\s+([A-Za-z_$][\w$.]*)").expect("extends regex is valid"));
static IMPLEMENTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bimplements\s+(.+)$").expect("implements regex is valid"));
static INTERFACE_EXTENDS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\binterface\s+[A-Za-z_$][\w$]*(?:<.*>)?\s+extends\s+(.+)$")
        .expect("interface extends regex is valid")
});
static TYPE_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z][\w$]*)\b").expect("type reference regex is valid"));
static ANNOTATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[:<,|&]\s*(?:React\.)?([A-Z][\w$]*)").expect("annotation regex is valid")
});
static PROPERTY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:readonly\s+)?([A-Za-z_$][\w$]*|'[^']*'|"[^"]*")(\?)?\s*:([\s\S]*)$"#)
        .expect("property regex is valid")
});
static METHOD_SIGNATURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_$][\w$]*)(\?)?\s*(?:<[^>]*>)?\s*(\([\s\S]*)$")
        .expect("method signature regex is valid")
});

/// Type names that never point at a project entity.
const BUILTIN_TYPES: &[&str] = &[
    "Array", "ReadonlyArray", "Promise", "Record", "Partial", "Required", "Readonly", "Pick",
    "Omit", "Exclude", "Extract", "ReturnType", "Parameters", "NonNullable", "Awaited", "Map",
    "Set", "WeakMap", "Date", "Error", "RegExp", "Function", "Object", "String", "Number",
    "Boolean", "Symbol", "React", "FC", "VFC", "FunctionComponent", "ReactNode", "ReactElement",
    "JSX", "Element", "HTMLElement", "PropsWithChildren", "ComponentProps", "Event",
];

const COMPONENT_BASES: &[&str] = &[
    "Component",
    "PureComponent",
    "React.Component",
    "React.PureComponent",
];

/// Signature lines inspected when the body brace is not found earlier.
const MAX_HEADER_LINES: usize = 5;

/// Enrich raw parser output and enforce the entity invariants.
pub fn finish(raw: Vec<SourceEntity>, text: &str, deps: &DependencyInfo) -> Vec<SourceEntity> {
    let lines: Vec<&str> = text.lines().collect();
    let sanitized = sanitize_lines(&lines);

    let mut entities: Vec<SourceEntity> = raw
        .into_iter()
        .filter(|e| e.start_line >= 1 && e.start_line <= lines.len().max(1))
        .map(|mut entity| {
            entity.end_line = entity.end_line.clamp(entity.start_line, lines.len().max(entity.start_line));
            enrich_entity(&mut entity, &lines, &sanitized, deps);
            entity
        })
        .collect();

    let names: HashSet<String> = entities.iter().map(|e| e.name.clone()).collect();
    for entity in &mut entities {
        let orphaned = match &entity.parent_name {
            Some(parent) => parent == &entity.name || !names.contains(parent),
            None => false,
        };
        if orphaned {
            entity.parent_name = None;
        }
    }

    entities.sort_by_key(|e| (e.start_line, e.end_line));
    entities
}

fn enrich_entity(entity: &mut SourceEntity, lines: &[&str], sanitized: &[String], deps: &DependencyInfo) {
    let start = entity.start_line - 1;
    let end = entity.end_line.min(lines.len());

    entity.documentation = leading_documentation(lines, start);

    let header = signature_header(&sanitized[start..end]);
    let mut refs = match entity.kind {
        EntityKind::Class => class_heritage(&header),
        EntityKind::Interface => interface_heritage(&header),
        EntityKind::TypeAlias => type_alias_refs(&sanitized[start..end]),
        EntityKind::Function | EntityKind::Variable | EntityKind::Method | EntityKind::UiComponent => {
            annotation_refs(&header)
        }
    };
    refs.retain(|r| r != &entity.name);
    for r in refs {
        if !entity.dependencies.contains(&r) {
            entity.dependencies.push(r);
        }
    }

    if entity.kind.is_type_contract() {
        let body = strip_comments(&lines[start..end].join("\n"));
        entity.child_entities = extract_members(&body, entity.kind);
    }

    if is_ui_component(entity, &lines[start..end].join("\n"), &header) {
        entity.kind = EntityKind::UiComponent;
    }

    if entity.kind != EntityKind::Method && entity.parent_name.is_none() && deps.exports_local(&entity.name) {
        entity.is_exported = true;
    }
}

/// Text of the `/** */` block or `//` run directly above `start`, skipping
/// decorator lines.
fn leading_documentation(lines: &[&str], start: usize) -> Option<String> {
    let mut i = start;
    while i > 0 && lines[i - 1].trim_start().starts_with('@') {
        i -= 1;
    }
    if i == 0 {
        return None;
    }

    let previous = lines[i - 1].trim();
    let collected: Vec<String> = if previous.ends_with("*/") {
        let mut j = i - 1;
        while !lines[j].contains("/*") {
            if j == 0 {
                return None;
            }
            j -= 1;
        }
        lines[j..i]
            .iter()
            .map(|line| {
                let line = line.trim();
                let line = line
                    .strip_prefix("/**")
                    .or_else(|| line.strip_prefix("/*"))
                    .unwrap_or(line);
                let line = line.strip_suffix("*/").unwrap_or(line).trim();
                line.strip_prefix('*').unwrap_or(line).trim().to_string()
            })
            .filter(|line| !line.is_empty())
            .collect()
    } else if previous.starts_with("//") {
        let mut j = i - 1;
        while j > 0 && lines[j - 1].trim_start().starts_with("//") {
            j -= 1;
        }
        lines[j..i]
            .iter()
            .map(|line| line.trim().trim_start_matches('/').trim().to_string())
            .filter(|line| !line.is_empty())
            .collect()
    } else {
        return None;
    };

    if collected.is_empty() {
        None
    } else {
        Some(collected.join("\n"))
    }
}

/// Sanitized text up to the body brace: the first `{` outside parentheses
/// and generics.
fn signature_header(entity_lines: &[String]) -> String {
    let mut header = String::new();
    let mut parens = 0i32;
    let mut angles = 0i32;
    let mut prev = ' ';

    for line in entity_lines.iter().take(MAX_HEADER_LINES) {
        for c in line.chars() {
            match c {
                '(' | '[' => parens += 1,
                ')' | ']' => parens = (parens - 1).max(0),
                '<' => angles += 1,
                '>' if prev != '=' => angles = (angles - 1).max(0),
                '{' if parens == 0 && angles == 0 => return header,
                _ => {}
            }
            header.push(c);
            prev = c;
        }
        header.push(' ');
    }
    header
}

fn class_heritage(header: &str) -> Vec<String> {
    let mut refs = Vec::new();
    if let Some(caps) = EXTENDS_RE.captures(header) {
        refs.push(caps[1].to_string());
    }
    if let Some(caps) = IMPLEMENTS_RE.captures(header) {
        refs.extend(split_type_list(&caps[1]));
    }
    refs
}

fn interface_heritage(header: &str) -> Vec<String> {
    INTERFACE_EXTENDS_RE
        .captures(header)
        .map(|caps| split_type_list(&caps[1]))
        .unwrap_or_default()
}

/// `A<T>, B.C, D` → `A, B.C, D`
fn split_type_list(list: &str) -> Vec<String> {
    strip_generics(list)
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.split_whitespace().next().unwrap_or(s).to_string())
        .collect()
}

fn strip_generics(text: &str) -> String {
    let mut depth = 0i32;
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth = (depth - 1).max(0),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn type_alias_refs(entity_lines: &[String]) -> Vec<String> {
    let joined = entity_lines.join(" ");
    let Some((_, rhs)) = joined.split_once('=') else {
        return Vec::new();
    };
    collect_refs(TYPE_REF_RE.captures_iter(rhs).map(|c| c[1].to_string()))
}

fn annotation_refs(header: &str) -> Vec<String> {
    collect_refs(ANNOTATION_RE.captures_iter(header).map(|c| c[1].to_string()))
}

fn collect_refs(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    for name in names {
        if !BUILTIN_TYPES.contains(&name.as_str()) && !refs.contains(&name) {
            refs.push(name);
        }
    }
    refs
}

fn is_ui_component(entity: &SourceEntity, body: &str, header: &str) -> bool {
    let capitalised = entity
        .name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_uppercase());
    match entity.kind {
        EntityKind::Function | EntityKind::Variable => {
            capitalised && (JSX_RE.is_match(body) || COMPONENT_TYPE_RE.is_match(header))
        }
        EntityKind::Class => entity
            .dependencies
            .iter()
            .any(|d| COMPONENT_BASES.contains(&d.as_str())),
        _ => false,
    }
}

/// Remove `//` and `/* */` comments, keeping string literals intact.
fn strip_comments(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    let mut quote: Option<char> = None;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(n) = next {
                    out.push(n);
                    i += 1;
                }
            } else if c == q || c == '\n' {
                quote = None;
            }
            i += 1;
            continue;
        }
        match (c, next) {
            ('/', Some('/')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
                continue;
            }
            ('"' | '\'' | '`', _) => {
                quote = Some(c);
                out.push(c);
            }
            _ => out.push(c),
        }
        i += 1;
    }
    out
}

/// Members of an interface body or an object type literal.
///
/// Each member keeps its annotation text verbatim; a member whose annotation
/// cannot be read is reported with type `unknown`.
fn extract_members(text: &str, kind: EntityKind) -> Vec<ChildEntity> {
    let search_from = match kind {
        EntityKind::TypeAlias => match text.find('=') {
            Some(idx) => idx + 1,
            None => return Vec::new(),
        },
        _ => 0,
    };
    let Some(body) = outer_braces(&text[search_from..]) else {
        return Vec::new();
    };

    split_members(body)
        .into_iter()
        .filter_map(|member| parse_member(&member))
        .collect()
}

/// Contents of the first top-level `{ ... }` pair.
fn outer_braces(text: &str) -> Option<&str> {
    let mut depth = 0i32;
    let mut angles = 0i32;
    let mut open = None;
    let mut quote: Option<char> = None;
    let mut prev = ' ';

    for (idx, c) in text.char_indices() {
        if let Some(q) = quote {
            if c == q && prev != '\\' {
                quote = None;
            }
            prev = c;
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '<' if open.is_none() => angles += 1,
            '>' if open.is_none() && prev != '=' => angles = (angles - 1).max(0),
            '{' => {
                if open.is_none() {
                    if angles > 0 {
                        prev = c;
                        continue;
                    }
                    open = Some(idx + 1);
                }
                depth += 1;
            }
            '}' if open.is_some() => {
                depth -= 1;
                if depth == 0 {
                    return open.map(|start| &text[start..idx]);
                }
            }
            _ => {}
        }
        prev = c;
    }
    None
}

/// Split on `;`, `,` and newlines that sit at nesting level zero.
fn split_members(body: &str) -> Vec<String> {
    let mut members = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut prev = ' ';

    for c in body.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q && prev != '\\' {
                quote = None;
            }
            prev = c;
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '{' | '(' | '[' | '<' => depth += 1,
            '}' | ')' | ']' => depth = (depth - 1).max(0),
            '>' if prev != '=' => depth = (depth - 1).max(0),
            _ => {}
        }
        if depth == 0 && matches!(c, ';' | ',' | '\n') {
            let continues = c == '\n' && current.trim_end().ends_with(['|', '&', ':', '=']);
            if !continues {
                members.push(std::mem::take(&mut current));
                prev = c;
                continue;
            }
        }
        current.push(c);
        prev = c;
    }
    members.push(current);

    // union members written on their own `| ...` lines belong to the previous member
    let mut merged: Vec<String> = Vec::new();
    for member in members {
        let trimmed = member.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('|') || trimmed.starts_with('&') {
            if let Some(last) = merged.last_mut() {
                last.push(' ');
                last.push_str(trimmed);
                continue;
            }
        }
        merged.push(trimmed.to_string());
    }
    merged
}

fn parse_member(member: &str) -> Option<ChildEntity> {
    let member = member.trim();
    if member.starts_with('[') || member.starts_with("...") {
        return None;
    }

    if let Some(caps) = PROPERTY_RE.captures(member) {
        let name = caps[1].trim_matches(|c| c == '\'' || c == '"').to_string();
        let annotation = normalise_whitespace(caps[3].trim().trim_end_matches([';', ',']).trim());
        return Some(ChildEntity {
            name,
            type_name: if annotation.is_empty() {
                "unknown".to_string()
            } else {
                annotation
            },
            kind: ChildKind::Property,
            optional: caps.get(2).is_some(),
        });
    }

    METHOD_SIGNATURE_RE.captures(member).map(|caps| ChildEntity {
        name: caps[1].to_string(),
        type_name: normalise_whitespace(caps[3].trim().trim_end_matches([';', ','])),
        kind: ChildKind::Method,
        optional: caps.get(2).is_some(),
    })
}

fn normalise_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
