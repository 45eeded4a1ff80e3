//! Finance assistant flow

use crate::flows::{Flow, Validate};
use crate::models::ExpenseRecord;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

pub struct FinanceChatbot;

/// One earlier exchange included for context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinanceChatbotInput {
    pub user_query: String,
    pub income: Option<f64>,
    pub expenses: Vec<ExpenseRecord>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinanceChatbotOutput {
    pub response: String,
}

impl Validate for FinanceChatbotOutput {
    fn validate(&self) -> Result<(), String> {
        if self.response.trim().is_empty() {
            Err("response is blank".to_string())
        } else {
            Ok(())
        }
    }
}

impl Flow for FinanceChatbot {
    const NAME: &'static str = "finance_chatbot";

    type Input = FinanceChatbotInput;
    type Output = FinanceChatbotOutput;

    fn system_prompt() -> &'static str {
        r#"You are a friendly personal finance assistant.

Guidelines:
- Answer using the user's own income and expense data when relevant
- Be concise and practical; do not invent transactions
- If the data cannot answer the question, say so and give general guidance
- Return ONLY valid JSON: { "response": "<answer>" }"#
    }

    fn render(input: &Self::Input) -> String {
        let mut prompt = String::new();

        match input.income {
            Some(income) => {
                let _ = writeln!(prompt, "Monthly income: {:.2}", income);
            }
            None => prompt.push_str("Monthly income: not provided\n"),
        }

        prompt.push_str("\nExpenses:\n");
        if input.expenses.is_empty() {
            prompt.push_str("(no expenses recorded)\n");
        }
        for expense in &input.expenses {
            let _ = writeln!(
                prompt,
                "- {}: {} {:.2} ({})",
                expense.date,
                expense.description,
                expense.amount,
                expense.category.as_deref().unwrap_or("uncategorized"),
            );
        }

        if !input.history.is_empty() {
            prompt.push_str("\nConversation so far:\n");
            for turn in &input.history {
                let _ = writeln!(prompt, "- {}: {}", turn.role, turn.content);
            }
        }

        let _ = write!(prompt, "\nUser question: {}", input.user_query);
        prompt
    }
}
