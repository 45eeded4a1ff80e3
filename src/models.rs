//! Core data models for TrackWise

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Category assigned when the model returns nothing usable.
pub const CATEGORY_OTHER: &str = "Other";

/// Category assigned when categorisation fails outright.
pub const CATEGORY_UNCATEGORIZED: &str = "Uncategorized";

/// Starting monthly income for a fresh store.
pub const DEFAULT_INCOME: f64 = 10_000.0;

//
// ================= Actions & Paths =================
//

/// A possible financial decision fed to the path enumerator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Action {
    pub name: String,
    pub description: String,
}

impl Action {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// An order-preserving subsequence of an action list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Path(Vec<Action>);

impl Path {
    pub fn new(actions: Vec<Action>) -> Self {
        Self(actions)
    }

    pub fn actions(&self) -> &[Action] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|a| a.name.as_str())
    }

    pub fn into_inner(self) -> Vec<Action> {
        self.0
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(no actions)");
        }
        let names: Vec<&str> = self.names().collect();
        write!(f, "{}", names.join(" -> "))
    }
}

//
// ================= Expenses =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expense {
    pub id: Uuid,
    pub description: String,
    pub amount: f64,
    pub category: Option<String>,
    pub date: DateTime<Utc>,
}

impl Expense {
    pub fn is_categorized(&self) -> bool {
        self.category.is_some()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Expense as submitted, before the store assigns id and date.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NewExpense {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub description: String,
    pub amount: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

impl NewExpense {
    pub fn new(description: impl Into<String>, amount: f64) -> Self {
        Self {
            description: description.into(),
            amount,
            ..Self::default()
        }
    }
}

/// Expense shape sent to flows: dates rendered as ISO-8601 text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpenseRecord {
    pub id: String,
    pub description: String,
    pub amount: f64,
    pub category: Option<String>,
    pub date: String,
}

impl From<&Expense> for ExpenseRecord {
    fn from(expense: &Expense) -> Self {
        Self {
            id: expense.id.to_string(),
            description: expense.description.clone(),
            amount: expense.amount,
            category: expense.category.clone(),
            date: expense.date.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Amount attached to a category (spend, budget goal, or prediction input).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryAmount {
    pub category: String,
    pub amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_serializes_as_array() {
        let path = Path::new(vec![Action::new("Save", "Put 10% aside")]);
        let json = serde_json::to_value(&path).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["name"], "Save");
    }

    #[test]
    fn test_path_display() {
        let path = Path::new(vec![
            Action::new("Save", "Put 10% aside"),
            Action::new("Invest", "Index fund"),
        ]);
        assert_eq!(path.to_string(), "Save -> Invest");
        assert_eq!(Path::default().to_string(), "(no actions)");
    }

    #[test]
    fn test_expense_record_uses_iso_dates() {
        let expense = Expense {
            id: Uuid::new_v4(),
            description: "Coffee".to_string(),
            amount: 4.5,
            category: None,
            date: "2024-03-01T08:30:00Z".parse().unwrap(),
        };

        let record = ExpenseRecord::from(&expense);
        assert_eq!(record.date, "2024-03-01T08:30:00.000Z");
        assert_eq!(record.category, None);
    }
}
