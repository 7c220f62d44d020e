use std::sync::LazyLock;

use regex::Regex;

use super::{DependencyInfo, ExportRecord, ImportRecord};

static IMPORT_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^import\s+(?:type\s+)?([\s\S]+?)\s+from\s+['"]([^'"]+)['"]"#)
        .expect("import regex is valid")
});
static IMPORT_BARE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^import\s+['"]([^'"]+)['"]"#).expect("bare import regex is valid")
});
static REQUIRE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:const|let|var)\s+(\{[^}]*\}|[A-Za-z_$][\w$]*)\s*=\s*require\(\s*['"]([^'"]+)['"]\s*\)"#)
        .expect("require regex is valid")
});
static EXPORT_DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*export\s+(default\s+)?(?:declare\s+)?(?:async\s+)?(?:abstract\s+)?(?:function\s*\*?|class|const|let|var|interface|type|enum)\s+([A-Za-z_$][\w$]*)")
        .expect("export declaration regex is valid")
});
static EXPORT_DEFAULT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*export\s+default\s+([A-Za-z_$][\w$]*)\s*;?\s*$")
        .expect("export default regex is valid")
});
static EXPORT_GROUP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*export\s+(?:type\s+)?\{([^}]*)\}").expect("export group regex is valid")
});
static MODULE_EXPORTS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*module\.exports\s*=\s*(\{[^}]*\}|[A-Za-z_$][\w$]*)")
        .expect("module.exports regex is valid")
});

/// Longest statement we are willing to join across lines.
const MAX_STATEMENT_LINES: usize = 40;

/// Scan import, require and export statements.
pub fn scan_dependencies(text: &str) -> DependencyInfo {
    let lines: Vec<&str> = text.lines().collect();
    let mut info = DependencyInfo::default();
    let mut i = 0;

    while i < lines.len() {
        let trimmed = lines[i].trim_start();

        if is_import_start(trimmed) {
            let (statement, end) = join_statement(&lines, i, is_import_complete);
            if let Some(record) = parse_import(&statement, i + 1, end + 1) {
                info.imports.push(record);
            }
            i = end + 1;
            continue;
        }

        if let Some(caps) = REQUIRE_RE.captures(lines[i]) {
            let binding = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let source = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            let (names, is_default) = if binding.starts_with('{') {
                (split_names(binding.trim_matches(|c| c == '{' || c == '}')), false)
            } else {
                (vec![binding.to_string()], true)
            };
            info.imports.push(ImportRecord {
                source: source.to_string(),
                imported_names: names,
                is_default,
                line: i + 1,
                end_line: i + 1,
            });
            i += 1;
            continue;
        }

        if trimmed.starts_with("export") {
            if trimmed.starts_with("export {") || trimmed.starts_with("export type {") || trimmed.starts_with("export{") {
                let (statement, end) = join_statement(&lines, i, |s| s.contains('}'));
                parse_export_group(&statement, i + 1, &mut info.exports);
                i = end + 1;
                continue;
            }
            if let Some(caps) = EXPORT_DECL_RE.captures(lines[i]) {
                let name = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                info.exports.push(ExportRecord {
                    exported_name: if caps.get(1).is_some() {
                        "default".to_string()
                    } else {
                        name.to_string()
                    },
                    local_name: name.to_string(),
                    is_default: caps.get(1).is_some(),
                    line: i + 1,
                });
            } else if let Some(caps) = EXPORT_DEFAULT_NAME_RE.captures(lines[i]) {
                let name = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                info.exports.push(ExportRecord {
                    exported_name: "default".to_string(),
                    local_name: name.to_string(),
                    is_default: true,
                    line: i + 1,
                });
            }
        } else if let Some(caps) = MODULE_EXPORTS_RE.captures(lines[i]) {
            let value = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            if value.starts_with('{') {
                for name in split_names(value.trim_matches(|c| c == '{' || c == '}')) {
                    info.exports.push(ExportRecord {
                        exported_name: name.clone(),
                        local_name: name,
                        is_default: false,
                        line: i + 1,
                    });
                }
            } else {
                info.exports.push(ExportRecord {
                    exported_name: "default".to_string(),
                    local_name: value.to_string(),
                    is_default: true,
                    line: i + 1,
                });
            }
        }

        i += 1;
    }

    info
}

fn is_import_start(trimmed: &str) -> bool {
    (trimmed.starts_with("import ") || trimmed.starts_with("import{") || trimmed.starts_with("import'") || trimmed.starts_with("import\""))
        && !trimmed.starts_with("import(")
}

fn is_import_complete(statement: &str) -> bool {
    IMPORT_FROM_RE.is_match(statement) || IMPORT_BARE_RE.is_match(statement) || statement.trim_end().ends_with(';')
}

/// Join lines from `start` until `complete` holds; returns the statement and
/// the index of its last line.
fn join_statement(lines: &[&str], start: usize, complete: impl Fn(&str) -> bool) -> (String, usize) {
    let mut statement = String::new();
    let last = lines.len().min(start + MAX_STATEMENT_LINES) - 1;
    for (i, line) in lines.iter().enumerate().take(last + 1).skip(start) {
        if !statement.is_empty() {
            statement.push(' ');
        }
        statement.push_str(line.trim());
        if complete(&statement) {
            return (statement, i);
        }
    }
    (statement, last)
}

fn parse_import(statement: &str, line: usize, end_line: usize) -> Option<ImportRecord> {
    if let Some(caps) = IMPORT_FROM_RE.captures(statement) {
        let clause = caps.get(1)?.as_str().trim();
        let source = caps.get(2)?.as_str().to_string();
        let (imported_names, is_default) = parse_import_clause(clause);
        return Some(ImportRecord {
            source,
            imported_names,
            is_default,
            line,
            end_line,
        });
    }
    IMPORT_BARE_RE.captures(statement).map(|caps| ImportRecord {
        source: caps.get(1).map(|m| m.as_str()).unwrap_or_default().to_string(),
        imported_names: Vec::new(),
        is_default: false,
        line,
        end_line,
    })
}

/// `Default, { a, b as c }` / `* as ns` / `{ a }`
fn parse_import_clause(clause: &str) -> (Vec<String>, bool) {
    let mut names = Vec::new();
    let mut is_default = false;

    let (head, braces) = match clause.find('{') {
        Some(idx) => (&clause[..idx], Some(&clause[idx..])),
        None => (clause, None),
    };

    for part in head.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some(ns) = part.strip_prefix('*') {
            let ns = ns.trim().trim_start_matches("as").trim();
            if !ns.is_empty() {
                names.push(ns.to_string());
            }
        } else {
            is_default = true;
            names.push(part.to_string());
        }
    }

    if let Some(braces) = braces {
        let inner = braces.trim_start_matches('{');
        let inner = inner.split('}').next().unwrap_or_default();
        names.extend(split_names(inner));
    }

    (names, is_default)
}

/// `a, type b, c as d` → original names `a, b, c`
fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(|item| item.trim().trim_start_matches("type ").trim())
        .filter(|item| !item.is_empty())
        .filter_map(|item| {
            let name = item.split_whitespace().next()?;
            let name = name.split(':').next()?.trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

fn parse_export_group(statement: &str, line: usize, exports: &mut Vec<ExportRecord>) {
    let Some(caps) = EXPORT_GROUP_RE.captures(statement) else {
        return;
    };
    let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    for item in inner.split(',') {
        let item = item.trim().trim_start_matches("type ").trim();
        if item.is_empty() {
            continue;
        }
        let mut parts = item.split_whitespace();
        let local = parts.next().unwrap_or_default().to_string();
        let exported = match (parts.next(), parts.next()) {
            (Some("as"), Some(alias)) => alias.to_string(),
            _ => local.clone(),
        };
        exports.push(ExportRecord {
            is_default: exported == "default",
            exported_name: exported,
            local_name: local,
            line,
        });
    }
}
