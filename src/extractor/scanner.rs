//! Regex-based structural scanner.
//!
//! Recognises keyword-prefixed declarations line by line and approximates
//! their extent by tracking brace depth over comment- and string-stripped
//! text. Used whenever the tree-sitter parser cannot handle a file.
use std::sync::LazyLock;

use regex::Regex;

use super::{EntityKind, SourceEntity};

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)")
        .expect("class regex is valid")
});
static INTERFACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(export\s+)?(?:default\s+)?(?:declare\s+)?interface\s+([A-Za-z_$][\w$]*)")
        .expect("interface regex is valid")
});
static TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(export\s+)?(?:declare\s+)?type\s+([A-Za-z_$][\w$]*)\s*(?:<[^=]*>)?\s*=")
        .expect("type regex is valid")
});
static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(export\s+)?(?:default\s+)?(?:declare\s+)?(?:async\s+)?function\b\s*\*?\s*([A-Za-z_$][\w$]*)")
        .expect("function regex is valid")
});
static VARIABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(export\s+)?(?:declare\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)")
        .expect("variable regex is valid")
});
/// Right-hand sides that make a variable a function.
static FUNCTION_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"=\s*(?:async\s+)?(?:function\b|\(|[A-Za-z_$][\w$]*\s*=>|(?:React\.)?(?:memo|forwardRef)\s*\()")
        .expect("function value regex is valid")
});
static METHOD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:public|private|protected|static|readonly|async|override|abstract|get|set)\s+)*\*?\s*([A-Za-z_$][\w$]*)\s*(?:<[^>(]*>)?\s*\(")
        .expect("method regex is valid")
});
static PROPERTY_FN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?:public|private|protected|static|readonly)\s+)*([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:\([^)]*\)|[A-Za-z_$][\w$]*)\s*(?::[^=]+)?=>")
        .expect("property function regex is valid")
});

const CONTROL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "function", "return", "with", "do", "else", "new",
    "typeof", "await", "super", "import",
];

const STATEMENT_STARTS: &[&str] = &[
    "export ", "const ", "let ", "var ", "function ", "class ", "interface ", "type ", "import ",
    "async ", "abstract ", "declare ",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Code,
    BlockComment,
    Template,
}

/// Strip comments and string literal bodies, keeping code characters only.
///
/// Block comments and template literals carry across lines; quoted strings
/// end at the line boundary.
pub(crate) fn sanitize_lines(lines: &[&str]) -> Vec<String> {
    let mut state = LexState::Code;
    let mut out = Vec::with_capacity(lines.len());

    for line in lines {
        let chars: Vec<char> = line.chars().collect();
        let mut code = String::with_capacity(chars.len());
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();
            match state {
                LexState::BlockComment => {
                    if c == '*' && next == Some('/') {
                        state = LexState::Code;
                        i += 1;
                    }
                }
                LexState::Template => {
                    if c == '\\' {
                        i += 1;
                    } else if c == '`' {
                        state = LexState::Code;
                    }
                }
                LexState::Code => match c {
                    '/' if next == Some('/') => break,
                    '/' if next == Some('*') => {
                        state = LexState::BlockComment;
                        i += 1;
                    }
                    '`' => state = LexState::Template,
                    '"' | '\'' => {
                        let quote = c;
                        i += 1;
                        while i < chars.len() && chars[i] != quote {
                            if chars[i] == '\\' {
                                i += 1;
                            }
                            i += 1;
                        }
                    }
                    _ => code.push(c),
                },
            }
            i += 1;
        }
        out.push(code);
    }

    out
}

/// Brace depth at the start of every line.
pub(crate) fn depth_per_line(sanitized: &[String]) -> Vec<i32> {
    let mut depth = 0i32;
    let mut result = Vec::with_capacity(sanitized.len());
    for line in sanitized {
        result.push(depth);
        for c in line.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth = (depth - 1).max(0),
                _ => {}
            }
        }
    }
    result
}

/// Index of the last line of the declaration starting at `start`.
///
/// Braces inside parentheses (destructured parameters, call arguments) are
/// ignored so `({ a }) => {` is not mistaken for a complete block.
pub(crate) fn find_block_end(sanitized: &[String], start: usize) -> usize {
    let mut depth = 0i32;
    let mut parens = 0i32;
    let mut opened = false;

    for (i, line) in sanitized.iter().enumerate().skip(start) {
        if !opened && i > start {
            let trimmed = line.trim_start();
            if trimmed.is_empty() && parens == 0 {
                return i - 1;
            }
            if parens == 0 && STATEMENT_STARTS.iter().any(|s| trimmed.starts_with(s)) {
                return i - 1;
            }
        }
        for c in line.chars() {
            match c {
                '(' | '[' => parens += 1,
                ')' | ']' => parens = (parens - 1).max(0),
                '{' if parens == 0 => {
                    depth += 1;
                    opened = true;
                }
                '}' if parens == 0 => {
                    depth -= 1;
                    if opened && depth <= 0 {
                        return i;
                    }
                }
                _ => {}
            }
        }
        if !opened && parens == 0 && line.trim_end().ends_with(';') {
            return i;
        }
    }

    sanitized.len().saturating_sub(1)
}

struct ClassScope {
    name: String,
    start: usize,
    end: usize,
    depth: i32,
}

/// Keyword-regex scanner with brace-depth boundaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexScanner;

impl RegexScanner {
    pub fn new() -> Self {
        Self
    }

    pub fn name(&self) -> &'static str {
        "regex-scanner"
    }

    pub fn scan(&self, text: &str) -> Vec<SourceEntity> {
        let lines: Vec<&str> = text.lines().collect();
        let sanitized = sanitize_lines(&lines);
        let depths = depth_per_line(&sanitized);

        let mut entities = Vec::new();
        let mut classes: Vec<ClassScope> = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            if sanitized[i].trim().is_empty() {
                continue;
            }
            classes.retain(|c| i <= c.end);
            let depth = depths[i];

            if depth == 0 {
                if let Some((kind, name, exported)) = match_top_level(line, &lines, i) {
                    let end = find_block_end(&sanitized, i);
                    let mut entity = SourceEntity::new(kind, name, i + 1, end + 1);
                    entity.is_exported = exported;
                    if kind == EntityKind::Class {
                        classes.push(ClassScope {
                            name: entity.name.clone(),
                            start: i,
                            end,
                            depth,
                        });
                    }
                    entities.push(entity);
                }
                continue;
            }

            let Some(class) = classes.last() else {
                continue;
            };
            if i <= class.start || depth != class.depth + 1 {
                continue;
            }
            if let Some(name) = match_method(line) {
                let end = find_block_end(&sanitized, i).min(class.end);
                let mut method = SourceEntity::new(EntityKind::Method, name, i + 1, end + 1);
                method.parent_name = Some(class.name.clone());
                entities.push(method);
            }
        }

        entities
    }
}

fn match_top_level(line: &str, lines: &[&str], i: usize) -> Option<(EntityKind, String, bool)> {
    let capture = |re: &Regex| {
        re.captures(line)
            .and_then(|c| c.get(2).map(|n| (n.as_str().to_string(), c.get(1).is_some())))
    };

    if let Some((name, exported)) = capture(&CLASS_RE) {
        return Some((EntityKind::Class, name, exported));
    }
    if let Some((name, exported)) = capture(&INTERFACE_RE) {
        return Some((EntityKind::Interface, name, exported));
    }
    if let Some((name, exported)) = capture(&TYPE_RE) {
        return Some((EntityKind::TypeAlias, name, exported));
    }
    if let Some((name, exported)) = capture(&FUNCTION_RE) {
        return Some((EntityKind::Function, name, exported));
    }
    if let Some((name, exported)) = capture(&VARIABLE_RE) {
        // look a few lines ahead for multi-line arrow signatures
        let header: String = lines[i..lines.len().min(i + 4)].join(" ");
        let is_function = FUNCTION_VALUE_RE.is_match(line)
            && (header.contains("=>") || header.contains("function") || header.contains("memo(") || header.contains("forwardRef("));
        let kind = if is_function {
            EntityKind::Function
        } else {
            EntityKind::Variable
        };
        return Some((kind, name, exported));
    }
    None
}

fn match_method(line: &str) -> Option<String> {
    let name = PROPERTY_FN_RE
        .captures(line)
        .or_else(|| METHOD_RE.captures(line))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())?;
    if CONTROL_KEYWORDS.contains(&name.as_str()) {
        return None;
    }
    // `foo(bar);` inside a class body is a stray call, not a member
    if line.trim_end().ends_with(';') && !line.contains("=>") && !line.contains(':') {
        return None;
    }
    Some(name)
}
