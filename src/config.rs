/// Configuration module for codescout.
///
/// Handles loading, validating, and providing default configuration values.
/// Confidence thresholds and the response-quality phrase lists live here so
/// they can be tuned per codebase without touching the pipeline.
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "codescout.json";

// ── Default value functions ──────────────────────────────────────────

fn default_root_dir() -> String {
    ".".to_string()
}

fn default_extensions() -> Vec<String> {
    ["ts", "tsx", "js", "jsx", "mjs", "cjs", "mts", "cts"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_results() -> usize {
    10
}

fn default_fast_max_results() -> usize {
    5
}

fn default_max_chunks_per_file() -> usize {
    8
}

fn default_context_lines() -> usize {
    2
}

fn default_max_files() -> usize {
    5000
}

fn default_workers() -> usize {
    8
}

fn default_exact() -> f64 {
    0.8
}

fn default_partial() -> f64 {
    0.5
}

fn default_inferred() -> f64 {
    0.3
}

fn default_drop_floor() -> f64 {
    0.05
}

fn default_fast_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_thorough_model() -> String {
    "claude-3-7-sonnet-latest".to_string()
}

fn default_api_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_tool_rounds() -> usize {
    6
}

fn default_min_response_chars() -> usize {
    100
}

fn default_uncertainty_threshold() -> usize {
    3
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_no_results_phrases() -> Vec<String> {
    strings(&[
        "couldn't find",
        "could not find",
        "unable to find",
        "didn't find",
        "did not find",
        "no matching",
        "no results",
        "no relevant",
        "no files found",
        "nothing found",
        "doesn't exist",
        "does not exist",
    ])
}

fn default_uncertainty_phrases() -> Vec<String> {
    strings(&[
        "might be",
        "may be",
        "possibly",
        "perhaps",
        "i think",
        "i believe",
        "not sure",
        "unclear",
        "it seems",
        "probably",
        "appears to",
        "likely",
    ])
}

fn default_low_confidence_phrases() -> Vec<String> {
    strings(&[
        "low confidence",
        "not confident",
        "i'm not certain",
        "i am not certain",
        "cannot be certain",
        "can't be sure",
        "best guess",
        "may be inaccurate",
    ])
}

fn default_structure_markers() -> Vec<String> {
    strings(&["path:", "analysis:"])
}

fn default_feedback_log_path() -> String {
    "./codescout-feedback.json".to_string()
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub verification: VerificationConfig,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub escalation: EscalationConfig,

    #[serde(default = "default_feedback_log_path")]
    pub feedback_log_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_root_dir")]
    pub root_dir: String,

    /// File extensions scanned, without the leading dot.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Result budget when the fast tier is hinted.
    #[serde(default = "default_fast_max_results")]
    pub fast_max_results: usize,

    #[serde(default = "default_max_chunks_per_file")]
    pub max_chunks_per_file: usize,

    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Concurrent chunking and verification tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Confidence policy. Must satisfy `0 <= drop_floor < inferred < partial < exact <= 1`.
///
/// Missing files score at most 0.05 regardless of `drop_floor`; a floor above
/// that only makes dropping them stricter.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct VerificationConfig {
    #[serde(default = "default_exact")]
    pub exact: f64,

    #[serde(default = "default_partial")]
    pub partial: f64,

    #[serde(default = "default_inferred")]
    pub inferred: f64,

    /// Results that do not exist and score at or below this are dropped.
    #[serde(default = "default_drop_floor")]
    pub drop_floor: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelsConfig {
    #[serde(default = "default_fast_model")]
    pub fast_model: String,

    #[serde(default = "default_thorough_model")]
    pub thorough_model: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EscalationConfig {
    #[serde(default = "default_min_response_chars")]
    pub min_response_chars: usize,

    #[serde(default = "default_uncertainty_threshold")]
    pub uncertainty_threshold: usize,

    #[serde(default = "default_no_results_phrases")]
    pub no_results_phrases: Vec<String>,

    #[serde(default = "default_uncertainty_phrases")]
    pub uncertainty_phrases: Vec<String>,

    #[serde(default = "default_low_confidence_phrases")]
    pub low_confidence_phrases: Vec<String>,

    #[serde(default = "default_structure_markers")]
    pub structure_markers: Vec<String>,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            verification: VerificationConfig::default(),
            models: ModelsConfig::default(),
            escalation: EscalationConfig::default(),
            feedback_log_path: default_feedback_log_path(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            extensions: default_extensions(),
            max_results: default_max_results(),
            fast_max_results: default_fast_max_results(),
            max_chunks_per_file: default_max_chunks_per_file(),
            context_lines: default_context_lines(),
            max_files: default_max_files(),
            workers: default_workers(),
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            exact: default_exact(),
            partial: default_partial(),
            inferred: default_inferred(),
            drop_floor: default_drop_floor(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            fast_model: default_fast_model(),
            thorough_model: default_thorough_model(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            min_response_chars: default_min_response_chars(),
            uncertainty_threshold: default_uncertainty_threshold(),
            no_results_phrases: default_no_results_phrases(),
            uncertainty_phrases: default_uncertainty_phrases(),
            low_confidence_phrases: default_low_confidence_phrases(),
            structure_markers: default_structure_markers(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"codescout.json"`.
    /// If the file does not exist, returns a default config and optionally
    /// generates a template file.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            // Generate template only for the default path
            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let mut cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");

        // An empty extension list would scan nothing
        if cfg.search.extensions.is_empty() {
            cfg.search.extensions = default_extensions();
        }
        for ext in &mut cfg.search.extensions {
            *ext = ext.trim_start_matches('.').to_ascii_lowercase();
        }

        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.models.fast_model.trim().is_empty(),
            "models.fast_model must be set"
        );
        anyhow::ensure!(
            !self.models.thorough_model.trim().is_empty(),
            "models.thorough_model must be set"
        );
        anyhow::ensure!(self.search.max_results > 0, "search.max_results must be positive");
        anyhow::ensure!(
            self.search.fast_max_results > 0,
            "search.fast_max_results must be positive"
        );
        anyhow::ensure!(self.search.workers > 0, "search.workers must be positive");
        anyhow::ensure!(self.search.max_files > 0, "search.max_files must be positive");
        anyhow::ensure!(
            self.search.max_chunks_per_file > 0,
            "search.max_chunks_per_file must be positive"
        );

        let v = &self.verification;
        anyhow::ensure!(
            0.0 <= v.drop_floor && v.drop_floor < v.inferred && v.inferred < v.partial && v.partial < v.exact && v.exact <= 1.0,
            "verification thresholds must satisfy 0 <= drop_floor < inferred < partial < exact <= 1"
        );
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
