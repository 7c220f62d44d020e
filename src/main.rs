use anyhow::{Context, Result};
use clap::Parser;
use codescout::config::Config;
use codescout::escalation::EscalationController;
use codescout::escalation::feedback::FileFeedbackSink;
use codescout::fs::{Filesystem, LocalFs};
use codescout::mcp::server::{McpContext, McpServer};
use codescout::model::http::HttpModelClient;
use codescout::model::tools::{LocalToolHost, ToolHost};
use codescout::search::SearchEngine;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "codescout", version, about = "Verified code search MCP server")]
struct Cli {
    /// Path to the JSON config file (default: codescout.json)
    #[arg(long, default_value = "")]
    config: String,

    /// Project root to search (overrides search.root_dir)
    #[arg(long)]
    root: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the MCP transport
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!("Starting codescout MCP Server...");

    // 1. Load config
    let mut config = Config::load(&cli.config).context("Failed to load configuration")?;
    if let Some(root) = cli.root {
        config.search.root_dir = root;
    }
    config.validate().context("Invalid configuration")?;
    let config = Arc::new(config);

    // 2. Search engine over the local tree
    let fs: Arc<dyn Filesystem> = Arc::new(LocalFs);
    let root = config.search.root_dir.clone();
    let engine = Arc::new(SearchEngine::new(&config, fs.clone(), root.clone()));

    // 3. Model tiers (optional)
    let tools: Arc<dyn ToolHost> = Arc::new(LocalToolHost::new(engine.clone(), fs, root));
    let controller = match HttpModelClient::from_config(&config.models, Some(tools)) {
        Ok(client) => {
            let feedback = Arc::new(FileFeedbackSink::new(&config.feedback_log_path));
            let controller = EscalationController::from_config(&config, Arc::new(client), feedback)
                .context("Failed to configure escalation")?;
            Some(Arc::new(controller))
        }
        Err(e) => {
            warn!("ask_codebase disabled: {e}");
            None
        }
    };

    // 4. Start Server
    let shutdown = CancellationToken::new();
    let server = McpServer::new(McpContext {
        engine,
        config,
        controller,
        shutdown: shutdown.clone(),
    });

    tokio::select! {
        result = server.start() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            shutdown.cancel();
        }
    }

    Ok(())
}
