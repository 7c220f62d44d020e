//! `ModelQuery` over a Messages-style HTTP API.
//!
//! Tool calls requested by the model are executed through a [`ToolHost`]
//! and fed back, for at most `max_tool_rounds` rounds per query.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::tools::{ToolHost, definitions};
use super::{AssistantResponse, Message, ModelError, ModelQuery, ModelTier, ToolSet, Usage};
use crate::config::ModelsConfig;

const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct HttpModelClient {
    http: Client,
    api_base: String,
    api_key: String,
    max_tokens: u32,
    max_tool_rounds: usize,
    timeout_secs: u64,
    tools: Option<Arc<dyn ToolHost>>,
}

impl HttpModelClient {
    /// Build a client from config, reading the key from `api_key_env`.
    pub fn from_config(config: &ModelsConfig, tools: Option<Arc<dyn ToolHost>>) -> Result<Self, ModelError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ModelError::Config(format!("environment variable {} is not set", config.api_key_env)))?;
        Self::new(config, api_key, tools)
    }

    pub fn new(config: &ModelsConfig, api_key: String, tools: Option<Arc<dyn ToolHost>>) -> Result<Self, ModelError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ModelError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            max_tokens: config.max_tokens,
            max_tool_rounds: config.max_tool_rounds,
            timeout_secs: config.timeout_secs,
            tools,
        })
    }

    async fn send(&self, body: &Value) -> Result<ApiResponse, ModelError> {
        let url = format!("{}/v1/messages", self.api_base);
        debug!("Sending model request to {url}");

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            return Err(ModelError::Api {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&text).map_err(|e| ModelError::Malformed(e.to_string()))
    }

    fn transport_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout(self.timeout_secs)
        } else {
            ModelError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl ModelQuery for HttpModelClient {
    async fn query(
        &self,
        conversation: &[Message],
        system_prompt: &str,
        tools: &ToolSet,
        tier: ModelTier,
        model: &str,
    ) -> Result<AssistantResponse, ModelError> {
        let mut messages: Vec<Value> = conversation
            .iter()
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect();
        let tool_defs = if self.tools.is_some() {
            definitions(tools)
        } else {
            Vec::new()
        };

        let mut usage = Usage::default();
        let mut round = 0usize;
        loop {
            let mut body = json!({
                "model": model,
                "max_tokens": self.max_tokens,
                "system": system_prompt,
                "messages": messages,
            });
            if !tool_defs.is_empty() {
                body["tools"] = json!(tool_defs);
            }

            let response = self.send(&body).await?;
            if let Some(u) = &response.usage {
                usage.add(Usage {
                    input_tokens: u.input_tokens,
                    output_tokens: u.output_tokens,
                });
            }
            if response.kind == "error" {
                return Err(ModelError::UnexpectedResponse(response.kind));
            }

            let tool_calls: Vec<(String, String, Value)> = response
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => Some((id.clone(), name.clone(), input.clone())),
                    _ => None,
                })
                .collect();

            let wants_tools = response.stop_reason.as_deref() == Some("tool_use") && !tool_calls.is_empty();
            match (&self.tools, wants_tools) {
                (Some(host), true) if round < self.max_tool_rounds => {
                    round += 1;
                    debug!(tier = %tier, round, calls = tool_calls.len(), "executing tool calls");
                    messages.push(json!({"role": "assistant", "content": raw_blocks(&response.content)}));

                    let mut results = Vec::with_capacity(tool_calls.len());
                    for (id, name, input) in tool_calls {
                        let (content, is_error) = if tools.contains(&name) {
                            match host.call(&name, &input).await {
                                Ok(out) => (out, false),
                                Err(msg) => (msg, true),
                            }
                        } else {
                            (format!("tool {name} is not available at this tier"), true)
                        };
                        results.push(json!({
                            "type": "tool_result",
                            "tool_use_id": id,
                            "content": content,
                            "is_error": is_error,
                        }));
                    }
                    messages.push(json!({"role": "user", "content": results}));
                }
                (_, wants_tools) => {
                    if wants_tools {
                        warn!(tier = %tier, "tool round limit reached, returning partial answer");
                    }
                    let text = response
                        .content
                        .iter()
                        .filter_map(|block| match block {
                            ContentBlock::Text { text } => Some(text.as_str()),
                            _ => None,
                        })
                        .collect::<Vec<_>>()
                        .join("\n");
                    return Ok(AssistantResponse {
                        response_type: response.role.unwrap_or(response.kind),
                        model: response.model.unwrap_or_else(|| model.to_string()),
                        text,
                        usage,
                    });
                }
            }
        }
    }
}

/// Re-serialise content blocks for the follow-up request.
fn raw_blocks(blocks: &[ContentBlock]) -> Vec<Value> {
    blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(json!({"type": "text", "text": text})),
            ContentBlock::ToolUse { id, name, input } => {
                Some(json!({"type": "tool_use", "id": id, "name": name, "input": input}))
            }
            ContentBlock::Other => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_use_response() {
        let raw = r#"{
            "id": "msg_1", "type": "message", "role": "assistant", "model": "m",
            "content": [
                {"type": "text", "text": "Looking."},
                {"type": "tool_use", "id": "tu_1", "name": "search_code", "input": {"query": "Widget"}},
                {"type": "thinking", "thinking": "..."}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 4}
        }"#;
        let parsed: ApiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content.len(), 3);
        assert!(matches!(parsed.content[2], ContentBlock::Other));
        let blocks = raw_blocks(&parsed.content);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1]["name"], "search_code");
        assert_eq!(parsed.usage.unwrap().input_tokens, 12);
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let config = ModelsConfig {
            api_key_env: "CODESCOUT_TEST_UNSET_KEY".to_string(),
            ..ModelsConfig::default()
        };
        let err = HttpModelClient::from_config(&config, None).err().unwrap();
        assert!(matches!(err, ModelError::Config(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let config = ModelsConfig {
            api_base: "http://127.0.0.1:9".to_string(),
            timeout_secs: 5,
            ..ModelsConfig::default()
        };
        let client = HttpModelClient::new(&config, "key".to_string(), None).unwrap();
        let err = client
            .query(&[Message::user("hi")], "", &ToolSet::fast(), ModelTier::Fast, "m")
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Transport(_) | ModelError::Timeout(_)));
    }
}
