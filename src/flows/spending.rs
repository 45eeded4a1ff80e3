//! Spending flows: categorisation, insights, patterns, prediction

use crate::flows::{require_amount, require_non_blank, Flow, Validate};
use crate::models::{CategoryAmount, ExpenseRecord};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

const ADVISOR_PROMPT: &str = r#"You are an expert personal finance advisor.

Guidelines:
- Base every statement on the data provided
- Be concise and practical
- Amounts are in US dollars
- Return ONLY valid JSON matching the requested format, with no explanation text"#;

fn render_expense_lines(out: &mut String, expenses: &[ExpenseRecord]) {
    if expenses.is_empty() {
        out.push_str("(no expenses recorded)\n");
        return;
    }
    for expense in expenses {
        let _ = writeln!(
            out,
            "- Date: {}, Description: {}, Amount: {:.2}, Category: {}",
            expense.date,
            expense.description,
            expense.amount,
            expense.category.as_deref().unwrap_or("uncategorized"),
        );
    }
}

fn render_category_lines(out: &mut String, entries: &[CategoryAmount]) {
    for entry in entries {
        let _ = writeln!(out, "- Category: {}, Amount: {:.2}", entry.category, entry.amount);
    }
}

//
// ================= Categorize Expense =================
//

pub struct CategorizeExpense;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizeExpenseInput {
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorizeExpenseOutput {
    /// Blank or missing means the model had no opinion.
    #[serde(default)]
    pub category: Option<String>,
}

impl Validate for CategorizeExpenseOutput {
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl Flow for CategorizeExpense {
    const NAME: &'static str = "categorize_expense";

    type Input = CategorizeExpenseInput;
    type Output = CategorizeExpenseOutput;

    fn system_prompt() -> &'static str {
        ADVISOR_PROMPT
    }

    fn render(input: &Self::Input) -> String {
        format!(
            r#"Categorize the following expense into a single short spending category
such as Food, Transportation, Entertainment, Housing, Utilities, Shopping, Health or Other.

Expense description: {}

JSON format:
{{ "category": "<category>" }}"#,
            input.description
        )
    }
}

//
// ================= Spending Insights =================
//

pub struct SpendingInsights;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingInsightsInput {
    pub income: f64,
    pub expenses: Vec<CategoryAmount>,
    pub budget_goals: Vec<CategoryAmount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingInsightsOutput {
    pub insights: Vec<String>,
}

impl Validate for SpendingInsightsOutput {
    fn validate(&self) -> Result<(), String> {
        require_non_blank("insights", &self.insights)
    }
}

impl Flow for SpendingInsights {
    const NAME: &'static str = "spending_insights";

    type Input = SpendingInsightsInput;
    type Output = SpendingInsightsOutput;

    fn system_prompt() -> &'static str {
        ADVISOR_PROMPT
    }

    fn render(input: &Self::Input) -> String {
        let mut prompt = String::new();
        let _ = writeln!(
            prompt,
            "Analyze the user's spending against their income and budget goals and give actionable insights.\n"
        );
        let _ = writeln!(prompt, "Monthly income: {:.2}\n", input.income);
        prompt.push_str("Spending by category:\n");
        render_category_lines(&mut prompt, &input.expenses);
        prompt.push_str("\nBudget goals by category:\n");
        render_category_lines(&mut prompt, &input.budget_goals);
        prompt.push_str("\nJSON format:\n{ \"insights\": [\"<insight>\", ...] }");
        prompt
    }
}

//
// ================= Spending Patterns =================
//

pub struct AnalyzeSpendingPatterns;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeSpendingPatternsInput {
    pub expenses: Vec<ExpenseRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeSpendingPatternsOutput {
    pub patterns: Vec<String>,
}

impl Validate for AnalyzeSpendingPatternsOutput {
    fn validate(&self) -> Result<(), String> {
        require_non_blank("patterns", &self.patterns)
    }
}

impl Flow for AnalyzeSpendingPatterns {
    const NAME: &'static str = "analyze_spending_patterns";

    type Input = AnalyzeSpendingPatternsInput;
    type Output = AnalyzeSpendingPatternsOutput;

    fn system_prompt() -> &'static str {
        ADVISOR_PROMPT
    }

    fn render(input: &Self::Input) -> String {
        let mut prompt = String::from(
            "Identify trends and recurring habits in the following expenses \
             (timing, frequency, categories that dominate, unusual spikes).\n\nExpenses:\n",
        );
        render_expense_lines(&mut prompt, &input.expenses);
        prompt.push_str("\nJSON format:\n{ \"patterns\": [\"<pattern>\", ...] }");
        prompt
    }
}

//
// ================= Budget Prediction =================
//

pub struct PredictBudget;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictBudgetInput {
    pub expenses: Vec<ExpenseRecord>,
    pub prediction_period: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPrediction {
    pub category: String,
    pub predicted_amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PredictBudgetOutput {
    pub predicted_total_spending: f64,
    #[serde(default)]
    pub category_predictions: Vec<CategoryPrediction>,
    #[serde(default)]
    pub confidence_note: Option<String>,
}

impl Validate for PredictBudgetOutput {
    fn validate(&self) -> Result<(), String> {
        require_amount("predictedTotalSpending", self.predicted_total_spending)?;
        for (i, prediction) in self.category_predictions.iter().enumerate() {
            if prediction.category.trim().is_empty() {
                return Err(format!("categoryPredictions[{}].category is blank", i));
            }
            require_amount(
                &format!("categoryPredictions[{}].predictedAmount", i),
                prediction.predicted_amount,
            )?;
        }
        Ok(())
    }
}

impl Flow for PredictBudget {
    const NAME: &'static str = "predict_budget";

    type Input = PredictBudgetInput;
    type Output = PredictBudgetOutput;

    fn system_prompt() -> &'static str {
        ADVISOR_PROMPT
    }

    fn render(input: &Self::Input) -> String {
        let mut prompt = format!(
            "Forecast the user's total spending for {} and break it down by category, \
             based on their historical expenses. If the history is too short or inconsistent, \
             say so in confidenceNote (start it with \"Insufficient data\").\n\nExpenses:\n",
            input.prediction_period
        );
        render_expense_lines(&mut prompt, &input.expenses);
        prompt.push_str(
            r#"
JSON format:
{
  "predictedTotalSpending": <number>,
  "categoryPredictions": [{ "category": "<category>", "predictedAmount": <number> }],
  "confidenceNote": "<short note>"
}"#,
        );
        prompt
    }
}
