//! # codescout — Verified Code Search MCP Server
//!
//! Locates functions, classes, types and UI components for a natural-language
//! request, attaches relationship context, ranks the candidates and re-checks
//! every one against the files on disk so fabricated results are suppressed.
//! Questions answered by a hosted model go through a fast tier first and
//! escalate to a thorough tier when the answer looks insufficient.
//!
//! ## Architecture
//!
//! - **[`extractor`]** — Tree-sitter entity extraction with a regex fallback
//! - **[`chunker`]** — Context-padded chunks and cross-file relationship linking
//! - **[`ranker`]** — Query analysis and weighted relevance scoring
//! - **[`verifier`]** — Filesystem verification, confidence and match type
//! - **[`search`]** — The end-to-end pipeline and its text report
//! - **[`escalation`]** — Fast/thorough tier state machine and feedback log
//! - **[`model`]** — Hosted model client and the tools it may call
//! - **[`mcp`]** — MCP server with `search_code` and `ask_codebase` (stdio via rmcp)
//! - **[`config`]** — Configuration loading and validation
//! - **[`fs`]** — Filesystem capability (local and in-memory)

pub mod chunker;
pub mod config;
pub mod escalation;
pub mod extractor;
pub mod fs;
pub mod mcp;
pub mod model;
pub mod models;
pub mod ranker;
pub mod search;
pub mod verifier;
