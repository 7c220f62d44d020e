//! Tools the hosted model may call while answering.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::ToolSet;
use crate::fs::{Filesystem, is_confined};
use crate::search::{SearchEngine, SearchRequest};

pub const SEARCH_CODE: &str = "search_code";
pub const READ_FILE: &str = "read_file";
pub const LIST_DIRECTORY: &str = "list_directory";

const MAX_READ_CHARS: usize = 20_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Definitions for the tools in `set`, in the set's order.
pub fn definitions(set: &ToolSet) -> Vec<ToolDefinition> {
    set.names()
        .iter()
        .filter_map(|name| definition(name))
        .collect()
}

fn definition(name: &str) -> Option<ToolDefinition> {
    let (description, input_schema) = match name {
        SEARCH_CODE => (
            "Search the codebase for functions, classes, types and components. Returns verified results with relationship analysis.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "What to look for"},
                    "file_type": {"type": "string", "description": "Extension filter, e.g. tsx"},
                    "directory": {"type": "string", "description": "Limit to a directory"},
                    "max_results": {"type": "integer", "minimum": 1}
                },
                "required": ["query"]
            }),
        ),
        READ_FILE => (
            "Read a file relative to the project root.",
            json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }),
        ),
        LIST_DIRECTORY => (
            "List the entries of a directory relative to the project root.",
            json!({
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": []
            }),
        ),
        _ => return None,
    };
    Some(ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        input_schema,
    })
}

/// Executes tool calls issued by the model. `Err` carries a message that is
/// sent back to the model as an error result.
#[async_trait]
pub trait ToolHost: Send + Sync {
    async fn call(&self, name: &str, input: &Value) -> Result<String, String>;
}

/// Tools backed by the search engine and the project filesystem.
pub struct LocalToolHost {
    engine: Arc<SearchEngine>,
    fs: Arc<dyn Filesystem>,
    root: PathBuf,
}

impl LocalToolHost {
    pub fn new(engine: Arc<SearchEngine>, fs: Arc<dyn Filesystem>, root: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            fs,
            root: root.into(),
        }
    }

    /// Join a model-supplied relative path onto the root, refusing escapes.
    fn confine(&self, relative: &str) -> Result<PathBuf, String> {
        let path = Path::new(relative.trim());
        if !is_confined(path) {
            return Err(format!("path must stay inside the project: {relative}"));
        }
        if relative.trim().is_empty() || relative.trim() == "." {
            return Ok(self.root.clone());
        }
        Ok(self.root.join(path))
    }

    fn read_file(&self, input: &Value) -> Result<String, String> {
        let relative = string_arg(input, "path")?;
        let path = self.confine(&relative)?;
        let resolved = self
            .fs
            .resolve(&path)
            .ok_or_else(|| format!("file not found: {relative}"))?;
        let mut text = self
            .fs
            .read_to_string(&resolved)
            .map_err(|e| format!("failed to read {relative}: {e}"))?;
        if text.chars().count() > MAX_READ_CHARS {
            text = text.chars().take(MAX_READ_CHARS).collect();
            text.push_str("\n... [truncated]");
        }
        Ok(text)
    }

    fn list_directory(&self, input: &Value) -> Result<String, String> {
        let relative = input
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or(".")
            .to_string();
        let path = self.confine(&relative)?;
        let resolved = self
            .fs
            .resolve(&path)
            .ok_or_else(|| format!("directory not found: {relative}"))?;
        let entries = self
            .fs
            .list(&resolved)
            .map_err(|e| format!("failed to list {relative}: {e}"))?;
        let lines: Vec<String> = entries
            .iter()
            .map(|entry| {
                let shown = entry.strip_prefix(&self.root).unwrap_or(entry);
                shown.to_string_lossy().replace('\\', "/")
            })
            .collect();
        Ok(lines.join("\n"))
    }
}

#[async_trait]
impl ToolHost for LocalToolHost {
    async fn call(&self, name: &str, input: &Value) -> Result<String, String> {
        match name {
            SEARCH_CODE => {
                let request = SearchRequest {
                    text: string_arg(input, "query")?,
                    file_type_filter: input.get("file_type").and_then(Value::as_str).map(String::from),
                    directory_filter: input.get("directory").and_then(Value::as_str).map(String::from),
                    max_results: input
                        .get("max_results")
                        .and_then(Value::as_u64)
                        .map(|n| n as usize),
                    ..SearchRequest::default()
                };
                Ok(self.engine.search(&request).await)
            }
            READ_FILE => self.read_file(input),
            LIST_DIRECTORY => self.list_directory(input),
            other => Err(format!("unknown tool: {other}")),
        }
    }
}

fn string_arg(input: &Value, key: &str) -> Result<String, String> {
    input
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(String::from)
        .ok_or_else(|| format!("missing required argument: {key}"))
}
