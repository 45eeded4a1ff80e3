//! Read-only projections over a store snapshot
//!
//! Everything here is pure: summaries, currency formatting, and the
//! payloads handed to flows.

use crate::flows::{
    AnalyzeSpendingPatternsInput, CategoryPrediction, ChatTurn, FinanceChatbotInput,
    PredictBudgetInput, SpendingInsightsInput,
};
use crate::models::{CategoryAmount, ExpenseRecord, CATEGORY_UNCATEGORIZED};
use crate::store::FinanceSnapshot;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Minimum expenses before pattern analysis is attempted.
pub const MIN_EXPENSES_FOR_PATTERNS: usize = 5;

/// Minimum expenses before a budget prediction is attempted.
pub const MIN_EXPENSES_FOR_PREDICTION: usize = 10;

/// Budget goals are suggested at this share of current category spend.
pub const BUDGET_GOAL_RATIO: f64 = 0.8;

pub const DEFAULT_PREDICTION_PERIOD: &str = "next month";

//
// ================= Summary =================
//

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryTotal {
    pub category: String,
    pub amount: f64,
    pub count: usize,
    /// Share of total spend, 0.0..=1.0
    pub share: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SpendingSummary {
    pub income: Option<f64>,
    pub total_spent: f64,
    pub remaining: Option<f64>,
    pub expense_count: usize,
    pub pending_categorization: usize,
    pub by_category: Vec<CategoryTotal>,
}

impl SpendingSummary {
    pub fn from_snapshot(snapshot: &FinanceSnapshot) -> Self {
        let total_spent: f64 = snapshot.expenses.iter().map(|e| e.amount).sum();

        let mut buckets: HashMap<&str, (f64, usize)> = HashMap::new();
        for expense in &snapshot.expenses {
            let category = expense.category.as_deref().unwrap_or(CATEGORY_UNCATEGORIZED);
            let entry = buckets.entry(category).or_insert((0.0, 0));
            entry.0 += expense.amount;
            entry.1 += 1;
        }

        let mut by_category: Vec<CategoryTotal> = buckets
            .into_iter()
            .map(|(category, (amount, count))| CategoryTotal {
                category: category.to_string(),
                amount,
                count,
                share: if total_spent > 0.0 { amount / total_spent } else { 0.0 },
            })
            .collect();

        by_category.sort_by(|a, b| {
            b.amount
                .total_cmp(&a.amount)
                .then_with(|| a.category.cmp(&b.category))
        });

        Self {
            income: snapshot.income,
            total_spent,
            remaining: snapshot.income.map(|income| income - total_spent),
            expense_count: snapshot.expenses.len(),
            pending_categorization: snapshot
                .expenses
                .iter()
                .filter(|e| !e.is_categorized())
                .count(),
            by_category,
        }
    }

    pub fn category_amounts(&self) -> Vec<CategoryAmount> {
        self.by_category
            .iter()
            .map(|t| CategoryAmount {
                category: t.category.clone(),
                amount: t.amount,
            })
            .collect()
    }
}

//
// ================= Currency =================
//

/// Format an amount as US dollars, `$--.--` when there is nothing to show.
pub fn format_currency(amount: Option<f64>) -> String {
    let Some(amount) = amount.filter(|a| a.is_finite()) else {
        return "$--.--".to_string();
    };

    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}${}.{}", sign, grouped, cents)
}

//
// ================= Flow Payloads =================
//

pub fn expense_records(snapshot: &FinanceSnapshot) -> Vec<ExpenseRecord> {
    snapshot.expenses.iter().map(ExpenseRecord::from).collect()
}

pub fn insights_input(snapshot: &FinanceSnapshot) -> SpendingInsightsInput {
    let summary = SpendingSummary::from_snapshot(snapshot);
    let expenses = summary.category_amounts();
    let budget_goals = expenses
        .iter()
        .map(|c| CategoryAmount {
            category: c.category.clone(),
            amount: (c.amount * BUDGET_GOAL_RATIO * 100.0).round() / 100.0,
        })
        .collect();

    SpendingInsightsInput {
        income: snapshot.income.unwrap_or(0.0),
        expenses,
        budget_goals,
    }
}

pub fn patterns_input(snapshot: &FinanceSnapshot) -> AnalyzeSpendingPatternsInput {
    AnalyzeSpendingPatternsInput {
        expenses: expense_records(snapshot),
    }
}

pub fn prediction_input(snapshot: &FinanceSnapshot, period: &str) -> PredictBudgetInput {
    PredictBudgetInput {
        expenses: expense_records(snapshot),
        prediction_period: period.to_string(),
    }
}

pub fn chatbot_input(
    snapshot: &FinanceSnapshot,
    question: &str,
    history: Vec<ChatTurn>,
) -> FinanceChatbotInput {
    FinanceChatbotInput {
        user_query: question.to_string(),
        income: snapshot.income,
        expenses: expense_records(snapshot),
        history,
    }
}

/// Category predictions ordered from largest to smallest.
pub fn sorted_category_predictions(predictions: &[CategoryPrediction]) -> Vec<CategoryPrediction> {
    let mut sorted = predictions.to_vec();
    sorted.sort_by(|a, b| b.predicted_amount.total_cmp(&a.predicted_amount));
    sorted
}

/// Content hash of the data a flow would see; equal hashes mean equal payloads.
pub fn fingerprint<T: Serialize>(payload: &T) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}
