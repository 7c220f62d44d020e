//! Language-model capability consumed by the escalation controller.
//!
//! The controller only inspects the response type, its text and the token
//! usage, so the whole hosted call sits behind [`ModelQuery`].
pub mod http;
pub mod tools;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ASSISTANT_RESPONSE: &str = "assistant";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Fast,
    Thorough,
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelTier::Fast => write!(f, "fast"),
            ModelTier::Thorough => write!(f, "thorough"),
        }
    }
}

/// Names of the tools a tier may call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSet {
    names: Vec<String>,
}

impl ToolSet {
    /// Search only.
    pub fn fast() -> Self {
        Self::from_names(&[tools::SEARCH_CODE])
    }

    pub fn thorough() -> Self {
        Self::from_names(&[tools::SEARCH_CODE, tools::READ_FILE, tools::LIST_DIRECTORY])
    }

    pub fn for_tier(tier: ModelTier) -> Self {
        match tier {
            ModelTier::Fast => Self::fast(),
            ModelTier::Thorough => Self::thorough(),
        }
    }

    pub fn from_names(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantResponse {
    /// `"assistant"` for a usable answer.
    pub response_type: String,
    pub model: String,
    pub text: String,
    pub usage: Usage,
}

impl AssistantResponse {
    pub fn assistant(model: impl Into<String>, text: impl Into<String>, usage: Usage) -> Self {
        Self {
            response_type: ASSISTANT_RESPONSE.to_string(),
            model: model.into(),
            text: text.into(),
            usage,
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.response_type == ASSISTANT_RESPONSE
    }
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("model call timed out after {0}s")]
    Timeout(u64),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response type: {0}")]
    UnexpectedResponse(String),

    #[error("model client misconfigured: {0}")]
    Config(String),
}

/// One round-trip to a hosted model.
///
/// Implementations must be `Send + Sync`; the controller holds them behind
/// an `Arc` and may be shared across requests.
#[async_trait]
pub trait ModelQuery: Send + Sync {
    async fn query(
        &self,
        conversation: &[Message],
        system_prompt: &str,
        tools: &ToolSet,
        tier: ModelTier,
        model: &str,
    ) -> Result<AssistantResponse, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_sets_per_tier() {
        let fast = ToolSet::for_tier(ModelTier::Fast);
        assert_eq!(fast.names(), ["search_code"]);
        let thorough = ToolSet::for_tier(ModelTier::Thorough);
        assert!(thorough.contains("read_file"));
        assert!(thorough.contains("list_directory"));
        assert!(!fast.contains("read_file"));
    }

    #[test]
    fn test_usage_add() {
        let mut usage = Usage {
            input_tokens: 10,
            output_tokens: 3,
        };
        usage.add(Usage {
            input_tokens: 5,
            output_tokens: 2,
        });
        assert_eq!(usage.input_tokens, 15);
        assert_eq!(usage.output_tokens, 5);
    }

    #[test]
    fn test_response_type() {
        let response = AssistantResponse::assistant("m", "text", Usage::default());
        assert!(response.is_assistant());
        let other = AssistantResponse {
            response_type: "error".to_string(),
            ..response
        };
        assert!(!other.is_assistant());
    }
}
