/// MCP Tool handlers for codescout.
///
/// 1. search_code  – verified structural search over the project tree
/// 2. ask_codebase – tiered model answer with a claim check on cited paths
use crate::escalation::{EscalationError, QueryRequest};
use crate::mcp::server::McpContext;
use crate::model::ModelTier;
use crate::search::SearchRequest;
use crate::search::report::claim_check_footer;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{ErrorData as McpError, handler::server::tool::ToolRouter, model::*, tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;

// ── Parameter structs ────────────────────────────────────────────────

#[derive(Deserialize, JsonSchema)]
struct SearchCodeParams {
    /// What to look for (natural language, entity names or file paths)
    query: String,
    /// Extension or glob filter (e.g. 'tsx', '*.test.ts')
    file_type: Option<String>,
    /// Limit search to a directory (e.g. 'src/components')
    directory: Option<String>,
    /// Include the cross-file relationships section (default: true for thorough)
    include_dependencies: Option<bool>,
    /// Max results (default: from config)
    max_results: Option<usize>,
    /// Search tier: fast | thorough (default: thorough)
    tier: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
struct AskParams {
    /// Question about the codebase
    question: String,
}

// ── Response helpers ─────────────────────────────────────────────────

fn text_result(text: String) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn error_result(msg: &str) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg.to_string())]))
}

fn parse_tier(tier: Option<&str>) -> Result<Option<ModelTier>, String> {
    match tier.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => Ok(None),
        Some("fast") => Ok(Some(ModelTier::Fast)),
        Some("thorough") => Ok(Some(ModelTier::Thorough)),
        Some(other) => Err(format!("unknown tier '{other}', expected fast or thorough")),
    }
}

// ── Tool implementations ─────────────────────────────────────────────

#[derive(Clone)]
pub struct AppTools {
    pub ctx: McpContext,
    pub tool_router: ToolRouter<Self>,
}

impl ServerHandler for AppTools {}

#[tool_router]
impl AppTools {
    pub fn new(ctx: McpContext) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    // ── Tool 1: search_code ─────────────────────────────────────────

    #[tool(
        description = "Search the codebase for functions, classes, types and UI components. Every result is re-checked against the files on disk and carries a confidence score, match type and relationship analysis."
    )]
    async fn search_code(&self, params: Parameters<SearchCodeParams>) -> Result<CallToolResult, McpError> {
        let p = params.0;
        if p.query.trim().is_empty() {
            return error_result("query is required");
        }
        let tier_hint = match parse_tier(p.tier.as_deref()) {
            Ok(t) => t,
            Err(msg) => return error_result(&msg),
        };

        let request = SearchRequest {
            text: p.query,
            file_type_filter: p.file_type,
            directory_filter: p.directory,
            include_dependencies: p.include_dependencies.unwrap_or(false),
            max_results: p.max_results,
            tier_hint,
        };
        text_result(self.ctx.engine.search(&request).await)
    }

    // ── Tool 2: ask_codebase ────────────────────────────────────────

    #[tool(
        description = "Answer a question about the codebase with a fast model, escalating to a thorough model when the answer looks insufficient. File paths cited in the answer are verified."
    )]
    async fn ask_codebase(&self, params: Parameters<AskParams>) -> Result<CallToolResult, McpError> {
        let question = params.0.question;
        if question.trim().is_empty() {
            return error_result("question is required");
        }
        let Some(controller) = self.ctx.controller.as_ref() else {
            return error_result(&format!(
                "ask_codebase is disabled: set the {} environment variable and restart",
                self.ctx.config.models.api_key_env
            ));
        };

        let cancel = self.ctx.shutdown.child_token();
        let result = match controller.run(&QueryRequest::new(question), &cancel).await {
            Ok(r) => r,
            Err(EscalationError::Cancelled) => return error_result("query cancelled"),
            Err(e) => return Err(McpError::internal_error(e.to_string(), None)),
        };

        let mut text = format!(
            "Answered by {} (escalated: {}, {} ms, {} input / {} output tokens)\n\n{}",
            result.model_used,
            if result.escalated { "yes" } else { "no" },
            result.duration_ms,
            result.input_tokens,
            result.output_tokens,
            result.response
        );
        let claims = self.ctx.engine.verify_claimed_paths(&result.response).await;
        if let Some(footer) = claim_check_footer(&claims) {
            text.push_str("\n\n");
            text.push_str(&footer);
        }

        if result.successful {
            text_result(text)
        } else {
            Ok(CallToolResult::error(vec![Content::text(text)]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tier() {
        assert_eq!(parse_tier(None), Ok(None));
        assert_eq!(parse_tier(Some("Fast")), Ok(Some(ModelTier::Fast)));
        assert_eq!(parse_tier(Some(" thorough ")), Ok(Some(ModelTier::Thorough)));
        assert!(parse_tier(Some("turbo")).is_err());
    }
}
