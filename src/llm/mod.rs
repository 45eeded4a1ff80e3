//! Language model trait and implementations
//!
//! The model is an opaque text-in/text-out service. Flows build the
//! request; the adapter validates whatever comes back.

use crate::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

pub mod gemini;
pub use gemini::GeminiClient;

/// One prompt sent to the model.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Name of the flow issuing the request.
    pub flow: &'static str,
    pub system: String,
    pub prompt: String,
    /// Structured input the prompt was rendered from.
    pub input: Value,
    /// Ask the model for a JSON-only reply.
    pub json: bool,
}

/// Trait for text generation (LLM controlled)
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<String>;

    fn name(&self) -> &'static str;
}

/// Mock model for development & testing
/// Keeps the service functional without an API key
pub struct MockLanguageModel;

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String> {
        let input = &request.input;

        let reply = match request.flow {
            "categorize_expense" => {
                let description = input
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                json!({ "category": guess_category(description) })
            }
            "spending_insights" => {
                let top = top_category(input.get("expenses"), "amount");
                json!({
                    "insights": [
                        format!("{} is your largest spending category.", top),
                        "Reviewing recurring costs is a quick way to stay under budget.",
                    ]
                })
            }
            "analyze_spending_patterns" => {
                let count = input
                    .get("expenses")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                json!({
                    "patterns": [
                        format!("{} expenses recorded so far.", count),
                        "Spending is spread across a small number of categories.",
                    ]
                })
            }
            "predict_budget" => {
                let records = input
                    .get("expenses")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                let total: f64 = records
                    .iter()
                    .filter_map(|r| r.get("amount").and_then(Value::as_f64))
                    .sum();
                json!({
                    "predictedTotalSpending": total,
                    "categoryPredictions": [],
                    "confidenceNote": "Mock prediction based on current spending"
                })
            }
            "finance_chatbot" => {
                let query = input
                    .get("userQuery")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                json!({
                    "response": format!(
                        "I can't reach a live model right now, but I received your question: {}",
                        query
                    )
                })
            }
            other => json!({ "error": format!("mock has no reply for {}", other) }),
        };

        Ok(reply.to_string())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

fn guess_category(description: &str) -> &'static str {
    let lowered = description.to_lowercase();
    let has_any = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));

    if has_any(&["grocer", "food", "coffee", "restaurant", "lunch", "dinner", "pizza"]) {
        "Food"
    } else if has_any(&["train", "bus", "taxi", "uber", "fuel", "gas", "parking"]) {
        "Transportation"
    } else if has_any(&["movie", "cinema", "netflix", "concert", "game"]) {
        "Entertainment"
    } else if has_any(&["rent", "mortgage"]) {
        "Housing"
    } else if has_any(&["electric", "water", "internet", "phone"]) {
        "Utilities"
    } else {
        ""
    }
}

fn top_category(entries: Option<&Value>, amount_key: &str) -> String {
    entries
        .and_then(Value::as_array)
        .and_then(|items| {
            items.iter().max_by(|a, b| {
                let a = a.get(amount_key).and_then(Value::as_f64).unwrap_or(0.0);
                let b = b.get(amount_key).and_then(Value::as_f64).unwrap_or(0.0);
                a.total_cmp(&b)
            })
        })
        .and_then(|item| item.get("category").and_then(Value::as_str))
        .unwrap_or("Other")
        .to_string()
}
