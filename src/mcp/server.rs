/// stdio MCP server exposing the search and ask tools.
use crate::mcp::tools::AppTools;
use anyhow::{Context, Result};
use rmcp::{ServiceExt, handler::server::router::Router, transport::io::stdio};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{config::Config, escalation::EscalationController, search::SearchEngine};

/// State shared by every tool call.
#[derive(Clone)]
pub struct McpContext {
    pub engine: Arc<SearchEngine>,
    pub config: Arc<Config>,
    /// Absent when no model API key is configured; `ask_codebase` then
    /// reports how to enable it.
    pub controller: Option<Arc<EscalationController>>,
    /// Cancelled on shutdown; every model call runs under a child token.
    pub shutdown: CancellationToken,
}

#[derive(Clone)]
pub struct McpServer {
    pub ctx: McpContext,
}

impl McpServer {
    pub fn new(ctx: McpContext) -> Self {
        Self { ctx }
    }

    /// Serve until the client hangs up.
    pub async fn start(self) -> Result<()> {
        info!("Starting MCP server on stdio...");
        let (stdin, stdout) = stdio();

        let tools = AppTools::new(self.ctx);
        let router = Router::new(tools.clone()).with_tools(tools.tool_router.clone());

        let service = router
            .serve((stdin, stdout))
            .await
            .context("failed to start the stdio session")?;
        service
            .waiting()
            .await
            .context("MCP session ended with an error")?;

        Ok(())
    }
}
