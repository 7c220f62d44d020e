//! Two-tier query protocol.
//!
//! A request is first answered by the fast model with the search tool only.
//! If that answer looks insufficient, or the call fails, the same
//! conversation goes to the thorough model. Only when the thorough call
//! itself fails is the request broadened and tried once more. The controller
//! never returns to the fast tier once it has escalated.
pub mod classifier;
pub mod feedback;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use self::classifier::{HeuristicClassifier, ResponseQualityClassifier};
use self::feedback::{FeedbackSink, QueryFeedback, TierOutcome, next_query_id};
use crate::config::Config;
use crate::model::{AssistantResponse, Message, ModelError, ModelQuery, ModelTier, ToolSet, Usage};
use crate::ranker::query::analyze;

pub const SYSTEM_PROMPT: &str = "You are a code search assistant. Use the search_code tool to locate the \
files, functions, classes, types and components that answer the request. For every relevant file, \
reply with a `Path:` line giving the file path followed by an `Analysis:` section explaining what \
it contains and how it relates to the request. Only report paths returned by your tools. If \
nothing relevant exists, say so plainly.";

const MAX_REFORMULATION_NAMES: usize = 5;

#[derive(Error, Debug)]
pub enum EscalationError {
    #[error("query cancelled")]
    Cancelled,

    #[error("escalation misconfigured: {0}")]
    Config(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    /// Overrides [`SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub successful: bool,
    pub escalated: bool,
    /// Final answer, or a diagnostic when every tier failed.
    pub response: String,
    pub model_used: String,
    pub duration_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

struct Attempt {
    model: String,
    outcome: Result<AssistantResponse, ModelError>,
    duration_ms: u64,
}

impl Attempt {
    fn usage(&self) -> Usage {
        self.outcome.as_ref().map(|r| r.usage).unwrap_or_default()
    }

    fn to_outcome(&self, success: bool, signals: Vec<String>) -> TierOutcome {
        let usage = self.usage();
        TierOutcome {
            model: self.model.clone(),
            success,
            duration_ms: self.duration_ms,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            signals,
            error: self.outcome.as_ref().err().map(|e| e.to_string()),
        }
    }
}

enum State {
    FastTier,
    Evaluate(Attempt),
    ThoroughTier,
    EvaluateThorough(Attempt),
    Reformulate,
    Done(QueryResult),
}

/// Outcomes gathered while walking the state machine.
#[derive(Default)]
struct Trace {
    fast: TierOutcome,
    thorough: Option<TierOutcome>,
    reformulated: Option<TierOutcome>,
    usage: Usage,
    errors: Vec<String>,
}

pub struct EscalationController {
    model: Arc<dyn ModelQuery>,
    feedback: Arc<dyn FeedbackSink>,
    classifier: Arc<dyn ResponseQualityClassifier>,
    fast_model: String,
    thorough_model: String,
}

impl EscalationController {
    /// Missing tier model names are rejected before any work starts.
    pub fn new(
        model: Arc<dyn ModelQuery>,
        feedback: Arc<dyn FeedbackSink>,
        fast_model: impl Into<String>,
        thorough_model: impl Into<String>,
    ) -> Result<Self, EscalationError> {
        let fast_model = fast_model.into();
        let thorough_model = thorough_model.into();
        if fast_model.trim().is_empty() {
            return Err(EscalationError::Config("fast model name is empty".to_string()));
        }
        if thorough_model.trim().is_empty() {
            return Err(EscalationError::Config("thorough model name is empty".to_string()));
        }
        Ok(Self {
            model,
            feedback,
            classifier: Arc::new(HeuristicClassifier::default()),
            fast_model,
            thorough_model,
        })
    }

    pub fn from_config(
        config: &Config,
        model: Arc<dyn ModelQuery>,
        feedback: Arc<dyn FeedbackSink>,
    ) -> Result<Self, EscalationError> {
        Ok(Self::new(
            model,
            feedback,
            config.models.fast_model.clone(),
            config.models.thorough_model.clone(),
        )?
        .with_classifier(Arc::new(HeuristicClassifier::new(config.escalation.clone()))))
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn ResponseQualityClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub async fn run(
        &self,
        request: &QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, EscalationError> {
        let started = Instant::now();
        let query_id = next_query_id();
        let system_prompt = request.system_prompt.as_deref().unwrap_or(SYSTEM_PROMPT);
        let conversation = vec![Message::user(request.text.clone())];
        let mut trace = Trace::default();

        let mut state = State::FastTier;
        let mut result = loop {
            state = match state {
                State::FastTier => {
                    let attempt = self
                        .attempt(ModelTier::Fast, &self.fast_model, &conversation, system_prompt, cancel)
                        .await?;
                    State::Evaluate(attempt)
                }
                State::Evaluate(attempt) => {
                    trace.usage.add(attempt.usage());
                    match &attempt.outcome {
                        Ok(response) => {
                            let assessment = self.classifier.assess(&response.text);
                            if assessment.sufficient {
                                trace.fast = attempt.to_outcome(true, Vec::new());
                                State::Done(self.finish(response.text.clone(), &attempt.model, false, true))
                            } else {
                                info!(
                                    query_id = %query_id,
                                    signals = ?assessment.signals,
                                    "fast tier insufficient, escalating"
                                );
                                trace.fast = attempt.to_outcome(false, assessment.signals);
                                State::ThoroughTier
                            }
                        }
                        Err(e) => {
                            info!(query_id = %query_id, "fast tier failed, escalating: {e}");
                            trace.errors.push(format!("fast tier: {e}"));
                            trace.fast = attempt.to_outcome(false, Vec::new());
                            State::ThoroughTier
                        }
                    }
                }
                State::ThoroughTier => {
                    let attempt = self
                        .attempt(ModelTier::Thorough, &self.thorough_model, &conversation, system_prompt, cancel)
                        .await?;
                    State::EvaluateThorough(attempt)
                }
                State::EvaluateThorough(attempt) => {
                    trace.usage.add(attempt.usage());
                    match &attempt.outcome {
                        Ok(response) => {
                            trace.thorough = Some(attempt.to_outcome(true, Vec::new()));
                            State::Done(self.finish(response.text.clone(), &attempt.model, true, true))
                        }
                        Err(e) => {
                            warn!(query_id = %query_id, "thorough tier failed, reformulating: {e}");
                            trace.errors.push(format!("thorough tier: {e}"));
                            trace.thorough = Some(attempt.to_outcome(false, Vec::new()));
                            State::Reformulate
                        }
                    }
                }
                State::Reformulate => {
                    let broadened = reformulate(&request.text);
                    debug!(query_id = %query_id, query = %broadened, "reformulated query");
                    let attempt = self
                        .attempt(
                            ModelTier::Thorough,
                            &self.thorough_model,
                            &[Message::user(broadened)],
                            system_prompt,
                            cancel,
                        )
                        .await?;
                    trace.usage.add(attempt.usage());
                    match &attempt.outcome {
                        Ok(response) => {
                            trace.reformulated = Some(attempt.to_outcome(true, Vec::new()));
                            State::Done(self.finish(response.text.clone(), &attempt.model, true, true))
                        }
                        Err(e) => {
                            warn!(query_id = %query_id, "reformulated query failed: {e}");
                            trace.errors.push(format!("reformulated query: {e}"));
                            trace.reformulated = Some(attempt.to_outcome(false, Vec::new()));
                            let diagnostic = format!(
                                "No tier could answer the request. {}",
                                trace.errors.join("; ")
                            );
                            State::Done(self.finish(diagnostic, &attempt.model, true, false))
                        }
                    }
                }
                State::Done(result) => break result,
            };
        };

        result.duration_ms = started.elapsed().as_millis() as u64;
        result.input_tokens = trace.usage.input_tokens;
        result.output_tokens = trace.usage.output_tokens;

        let record = QueryFeedback {
            query_id,
            query_text: request.text.clone(),
            timestamp: Utc::now(),
            fast: trace.fast,
            thorough: trace.thorough,
            reformulated: trace.reformulated,
            escalated: result.escalated,
            successful: result.successful,
            model_used: result.model_used.clone(),
            total_duration_ms: result.duration_ms,
        };
        self.persist(record).await;

        Ok(result)
    }

    /// One model call raced against cancellation.
    async fn attempt(
        &self,
        tier: ModelTier,
        model: &str,
        conversation: &[Message],
        system_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<Attempt, EscalationError> {
        let tools = ToolSet::for_tier(tier);
        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EscalationError::Cancelled),
            outcome = self.model.query(conversation, system_prompt, &tools, tier, model) => outcome,
        };
        let outcome = outcome.and_then(|response| {
            if response.is_assistant() {
                Ok(response)
            } else {
                Err(ModelError::UnexpectedResponse(response.response_type))
            }
        });
        debug!(tier = %tier, model, ok = outcome.is_ok(), "tier attempt finished");
        Ok(Attempt {
            model: model.to_string(),
            outcome,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn finish(&self, response: String, model: &str, escalated: bool, successful: bool) -> QueryResult {
        QueryResult {
            successful,
            escalated,
            response,
            model_used: model.to_string(),
            duration_ms: 0,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    /// Best effort: a failing sink never affects the returned result.
    async fn persist(&self, record: QueryFeedback) {
        let sink = Arc::clone(&self.feedback);
        match tokio::task::spawn_blocking(move || sink.record(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to write query feedback: {e}"),
            Err(e) => warn!("Feedback task failed: {e}"),
        }
    }
}

/// Broaden a request to the entity names or salient terms it mentions.
pub fn reformulate(text: &str) -> String {
    let analysis = analyze(text);
    let subjects: Vec<String> = if analysis.entity_candidates.is_empty() {
        analysis
            .terms
            .iter()
            .take(MAX_REFORMULATION_NAMES)
            .cloned()
            .collect()
    } else {
        analysis
            .entity_candidates
            .iter()
            .take(MAX_REFORMULATION_NAMES)
            .cloned()
            .collect()
    };
    let subject = if subjects.is_empty() {
        text.trim().to_string()
    } else {
        subjects.join(", ")
    };
    format!(
        "Find all files related to {subject}. For each file give a Path: line and an Analysis: section."
    )
}
