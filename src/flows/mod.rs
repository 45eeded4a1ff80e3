//! Prompt adapter and flow definitions
//!
//! A flow is a typed prompt contract: structured input is rendered into a
//! prompt, the model answers with JSON, and the answer is checked against
//! the flow's output schema before anyone sees it.

use crate::error::TrackwiseError;
use crate::llm::{LanguageModel, ModelRequest};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub mod action_paths;
pub mod chatbot;
pub mod spending;

pub use action_paths::{ExploreActionPathsInput, ExploreActionPathsOutput};
pub use chatbot::{ChatTurn, FinanceChatbot, FinanceChatbotInput, FinanceChatbotOutput};
pub use spending::{
    AnalyzeSpendingPatterns, AnalyzeSpendingPatternsInput, AnalyzeSpendingPatternsOutput,
    CategorizeExpense, CategorizeExpenseInput, CategorizeExpenseOutput, CategoryPrediction,
    PredictBudget, PredictBudgetInput, PredictBudgetOutput, SpendingInsights,
    SpendingInsightsInput, SpendingInsightsOutput,
};

/// Schema checks serde cannot express.
pub trait Validate {
    fn validate(&self) -> std::result::Result<(), String>;
}

/// A typed prompt/response contract.
pub trait Flow {
    const NAME: &'static str;

    type Input: Serialize + Send + Sync;
    type Output: DeserializeOwned + Validate + Send;

    fn system_prompt() -> &'static str;

    fn render(input: &Self::Input) -> String;
}

/// Runs flows against a language model.
#[derive(Clone)]
pub struct PromptAdapter {
    model: Arc<dyn LanguageModel>,
}

impl PromptAdapter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub fn model_name(&self) -> &'static str {
        self.model.name()
    }

    /// Render, call the model, and validate the reply. No retries.
    pub async fn run<F: Flow>(&self, input: &F::Input) -> Result<F::Output> {
        let request = ModelRequest {
            flow: F::NAME,
            system: F::system_prompt().to_string(),
            prompt: F::render(input),
            input: serde_json::to_value(input)?,
            json: true,
        };

        let started = Instant::now();

        let raw = self.model.complete(&request).await.map_err(|e| {
            warn!(flow = F::NAME, model = self.model.name(), "Model call failed: {}", e);
            e
        })?;

        let output = parse_reply::<F::Output>(F::NAME, &raw).map_err(|e| {
            warn!(flow = F::NAME, "Rejected model reply: {}", e);
            e
        })?;

        info!(
            flow = F::NAME,
            model = self.model.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Flow completed"
        );

        Ok(output)
    }
}

/// Parse a model reply, tolerating a markdown code fence around the JSON.
pub fn parse_reply<T: DeserializeOwned + Validate>(flow: &'static str, raw: &str) -> Result<T> {
    let cleaned = strip_code_fence(raw);

    if cleaned.is_empty() {
        return Err(TrackwiseError::ModelDeclined(format!(
            "{} returned an empty reply",
            flow
        )));
    }

    let parsed: T = serde_json::from_str(cleaned).map_err(|e| TrackwiseError::SchemaMismatch {
        flow,
        reason: e.to_string(),
    })?;

    parsed
        .validate()
        .map_err(|reason| TrackwiseError::SchemaMismatch { flow, reason })?;

    Ok(parsed)
}

/// Body of the first fenced block, or the whole reply when it has none.
/// The info string after the opening fence (`json`, `JSON`, ...) and any
/// prose around the block are dropped.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };

    let after = &trimmed[open + 3..];
    let info_len = after
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after.len());
    let body = &after[info_len..];

    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Shared check: every entry in a list of strings is non-blank.
pub(crate) fn require_non_blank(field: &str, values: &[String]) -> std::result::Result<(), String> {
    match values.iter().position(|v| v.trim().is_empty()) {
        Some(index) => Err(format!("{}[{}] is blank", field, index)),
        None => Ok(()),
    }
}

/// Shared check: an amount is a finite, non-negative number.
pub(crate) fn require_amount(field: &str, value: f64) -> std::result::Result<(), String> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(format!("{} must be a non-negative number, got {}", field, value))
    }
}
