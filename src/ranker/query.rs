use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[\w@~.\-]+/)*[\w\-.]+\.(?:tsx|ts|jsx|js|mjs|cjs|mts|cts|vue|svelte|json|css|scss)\b")
        .expect("path regex is valid")
});
static PASCAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][a-zA-Z0-9]*[a-z][a-zA-Z0-9]*$").expect("pascal case regex is valid")
});
static CAMEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9]*[A-Z][a-zA-Z0-9]*$").expect("camel case regex is valid"));

const STOP_WORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "be", "by", "can", "code", "codebase", "defined",
    "definition", "do", "does", "file", "files", "find", "for", "from", "get", "give", "how", "i",
    "in", "is", "it", "its", "list", "look", "me", "my", "of", "on", "or", "please", "search",
    "show", "some", "tell", "that", "the", "there", "this", "to", "what", "when", "where", "which",
    "who", "why", "with", "you", "locate", "need", "want", "we", "our", "should", "would",
];

const UI_TERMS: &[&str] = &[
    "component", "components", "ui", "render", "renders", "rendering", "button", "modal", "form",
    "page", "view", "layout", "jsx", "tsx", "props", "style", "styles", "css", "widget", "screen",
    "dialog", "display", "element", "template",
];
const DATA_TERMS: &[&str] = &[
    "data", "model", "models", "schema", "type", "types", "interface", "interfaces", "store",
    "state", "database", "db", "fetch", "api", "query", "entity", "record", "dto", "reducer",
    "context",
];
const RELATIONSHIP_TERMS: &[&str] = &[
    "import", "imports", "imported", "export", "exports", "exported", "depends", "dependency",
    "dependencies", "uses", "used", "extends", "inherits", "implements", "relationship",
    "relationships", "related", "calls", "connected", "connection",
];
const UTILITY_TERMS: &[&str] = &[
    "util", "utils", "utility", "utilities", "helper", "helpers", "format", "formatter", "parse",
    "parser", "convert", "validate", "validation", "transform", "lib",
];
const EVENT_TERMS: &[&str] = &[
    "event", "events", "handler", "handlers", "click", "onclick", "submit", "listener", "listen",
    "emit", "dispatch", "callback", "trigger", "subscribe", "hook", "hooks",
];
const TESTING_TERMS: &[&str] = &[
    "test", "tests", "testing", "spec", "mock", "mocks", "jest", "vitest", "fixture", "fixtures",
    "assert", "expect",
];

/// Domain a request is about. A request may touch several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryCategory {
    Ui,
    Data,
    Relationship,
    Utility,
    Event,
    Testing,
}

impl QueryCategory {
    fn keywords(&self) -> &'static [&'static str] {
        match self {
            QueryCategory::Ui => UI_TERMS,
            QueryCategory::Data => DATA_TERMS,
            QueryCategory::Relationship => RELATIONSHIP_TERMS,
            QueryCategory::Utility => UTILITY_TERMS,
            QueryCategory::Event => EVENT_TERMS,
            QueryCategory::Testing => TESTING_TERMS,
        }
    }

    pub fn all() -> [QueryCategory; 6] {
        [
            QueryCategory::Ui,
            QueryCategory::Data,
            QueryCategory::Relationship,
            QueryCategory::Utility,
            QueryCategory::Event,
            QueryCategory::Testing,
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// Lowercased request with collapsed whitespace.
    pub text: String,
    /// Lowercased content words, stop words removed, in order of appearance.
    pub terms: Vec<String>,
    /// Identifier-shaped tokens kept in their original case.
    pub entity_candidates: Vec<String>,
    pub categories: Vec<QueryCategory>,
    /// File paths written in the request.
    pub path_mentions: Vec<String>,
}

impl QueryAnalysis {
    pub fn has(&self, category: QueryCategory) -> bool {
        self.categories.contains(&category)
    }

    /// Entity candidates plus the stems of mentioned paths.
    pub fn file_name_candidates(&self) -> Vec<String> {
        let mut names = self.entity_candidates.clone();
        for path in &self.path_mentions {
            let stem = path
                .rsplit('/')
                .next()
                .and_then(|f| f.split('.').next())
                .unwrap_or_default();
            if !stem.is_empty() && !names.iter().any(|n| n == stem) {
                names.push(stem.to_string());
            }
        }
        names
    }
}

/// Drop sentence punctuation and leading `./` segments; `..` is kept as written.
fn clean_mention(raw: &str) -> String {
    let mut path = raw.trim_end_matches(['.', '`']);
    while let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    path.to_string()
}

pub fn analyze(request: &str) -> QueryAnalysis {
    let path_mentions: Vec<String> = PATH_RE
        .find_iter(request)
        .map(|m| clean_mention(m.as_str()))
        .filter(|p| p.contains('.'))
        .fold(Vec::new(), |mut acc, p| {
            if !acc.contains(&p) {
                acc.push(p);
            }
            acc
        });
    let without_paths = PATH_RE.replace_all(request, " ");

    let tokens: Vec<&str> = without_paths
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
        .filter(|t| !t.is_empty())
        .collect();

    let mut terms: Vec<String> = Vec::new();
    let mut entity_candidates: Vec<String> = Vec::new();
    let mut categories: Vec<QueryCategory> = Vec::new();

    for token in &tokens {
        let lower = token.to_lowercase();
        for category in QueryCategory::all() {
            if category.keywords().contains(&lower.as_str()) && !categories.contains(&category) {
                categories.push(category);
            }
        }
        if STOP_WORDS.contains(&lower.as_str()) {
            continue;
        }
        if (PASCAL_RE.is_match(token) || CAMEL_RE.is_match(token)) && !entity_candidates.iter().any(|c| c == token) {
            entity_candidates.push(token.to_string());
        }
        if lower.chars().count() >= 2 && !terms.contains(&lower) {
            terms.push(lower);
        }
    }

    QueryAnalysis {
        text: request.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase(),
        terms,
        entity_candidates,
        categories,
        path_mentions,
    }
}
