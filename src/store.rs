//! Finance state store
//!
//! Single-writer store for income and expenses. Every mutation goes through
//! [`Command`] and the reducer; readers get cloned snapshots.
//! Currently in-memory only.

use crate::error::TrackwiseError;
use crate::models::{Expense, NewExpense};
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Mutations accepted by the store.
#[derive(Debug, Clone)]
pub enum Command {
    SetIncome(f64),
    AddExpense(NewExpense),
    UpdateExpense(Expense),
    /// Assign a category only if the expense has none yet. Other fields
    /// are never touched.
    CategorizeIfUnset { id: Uuid, category: String },
    DeleteExpense(Uuid),
}

/// Outcome of an applied command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    IncomeSet { income: f64 },
    ExpenseAdded { expense: Expense },
    ExpenseUpdated { expense: Expense },
    /// Categorisation skipped because a category was already set.
    CategoryKept { expense: Expense },
    ExpenseDeleted { expense: Expense },
}

/// Read-only copy of the store at one revision.
#[derive(Debug, Clone, Serialize)]
pub struct FinanceSnapshot {
    pub income: Option<f64>,
    pub expenses: Vec<Expense>,
    pub revision: u64,
}

#[derive(Debug, Clone)]
struct FinanceState {
    income: Option<f64>,
    expenses: Vec<Expense>,
    revision: u64,
}

impl FinanceState {
    fn reduce(&mut self, command: Command) -> Result<StoreEvent> {
        let event = match command {
            Command::SetIncome(income) => {
                validate_positive("Income", income)?;
                self.income = Some(income);
                StoreEvent::IncomeSet { income }
            }
            Command::AddExpense(new_expense) => {
                let expense = Expense {
                    id: new_expense.id.unwrap_or_else(Uuid::new_v4),
                    description: new_expense.description.trim().to_string(),
                    amount: new_expense.amount,
                    category: new_expense.category,
                    date: new_expense.date.unwrap_or_else(Utc::now),
                };
                validate_expense(&expense)?;

                if self.expenses.iter().any(|e| e.id == expense.id) {
                    return Err(TrackwiseError::Validation(format!(
                        "Expense {} already exists",
                        expense.id
                    )));
                }

                self.expenses.push(expense.clone());
                StoreEvent::ExpenseAdded { expense }
            }
            Command::UpdateExpense(mut updated) => {
                updated.description = updated.description.trim().to_string();
                updated.category = normalize_category(updated.category);
                validate_expense(&updated)?;

                let slot = self
                    .expenses
                    .iter_mut()
                    .find(|e| e.id == updated.id)
                    .ok_or_else(|| not_found(updated.id))?;
                *slot = updated.clone();
                StoreEvent::ExpenseUpdated { expense: updated }
            }
            Command::CategorizeIfUnset { id, category } => {
                let category = normalize_category(Some(category)).ok_or_else(|| {
                    TrackwiseError::Validation("Category must not be blank.".to_string())
                })?;

                let slot = self
                    .expenses
                    .iter_mut()
                    .find(|e| e.id == id)
                    .ok_or_else(|| not_found(id))?;
                if slot.category.is_some() {
                    // Nothing changed, so no new revision.
                    return Ok(StoreEvent::CategoryKept {
                        expense: slot.clone(),
                    });
                }
                slot.category = Some(category);
                StoreEvent::ExpenseUpdated {
                    expense: slot.clone(),
                }
            }
            Command::DeleteExpense(id) => {
                let index = self
                    .expenses
                    .iter()
                    .position(|e| e.id == id)
                    .ok_or_else(|| not_found(id))?;
                let expense = self.expenses.remove(index);
                StoreEvent::ExpenseDeleted { expense }
            }
        };

        self.revision += 1;
        Ok(event)
    }

    fn snapshot(&self) -> FinanceSnapshot {
        FinanceSnapshot {
            income: self.income,
            expenses: self.expenses.clone(),
            revision: self.revision,
        }
    }
}

/// Trimmed category; blank counts as none.
fn normalize_category(category: Option<String>) -> Option<String> {
    category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn not_found(id: Uuid) -> TrackwiseError {
    TrackwiseError::NotFound(format!("Expense {} not found", id))
}

fn validate_positive(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(TrackwiseError::Validation(format!(
            "{} must be a positive number.",
            field
        )))
    }
}

fn validate_expense(expense: &Expense) -> Result<()> {
    if expense.description.is_empty() {
        return Err(TrackwiseError::Validation(
            "Description is required.".to_string(),
        ));
    }
    validate_positive("Amount", expense.amount)
}

/// In-memory finance store shared by every view.
pub struct FinanceStore {
    state: RwLock<FinanceState>,
    revision_tx: watch::Sender<u64>,
}

impl FinanceStore {
    pub fn new(income: Option<f64>) -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            state: RwLock::new(FinanceState {
                income,
                expenses: Vec::new(),
                revision: 0,
            }),
            revision_tx,
        }
    }

    /// Apply one command under the write lock and notify subscribers.
    pub async fn apply(&self, command: Command) -> Result<StoreEvent> {
        let mut state = self.state.write().await;
        let previous = state.revision;
        let event = state.reduce(command)?;
        let revision = state.revision;
        drop(state);

        if revision != previous {
            debug!(revision, ?event, "Store updated");
            self.revision_tx.send_replace(revision);
        }

        Ok(event)
    }

    pub async fn snapshot(&self) -> FinanceSnapshot {
        self.state.read().await.snapshot()
    }

    pub async fn expense(&self, id: Uuid) -> Option<Expense> {
        let state = self.state.read().await;
        state.expenses.iter().find(|e| e.id == id).cloned()
    }

    pub async fn income(&self) -> Option<f64> {
        self.state.read().await.income
    }

    /// Receiver that observes every new revision.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    pub async fn set_income(&self, income: f64) -> Result<()> {
        self.apply(Command::SetIncome(income)).await?;
        info!(income, "Income updated");
        Ok(())
    }

    pub async fn add_expense(&self, new_expense: NewExpense) -> Result<Expense> {
        match self.apply(Command::AddExpense(new_expense)).await? {
            StoreEvent::ExpenseAdded { expense } => Ok(expense),
            other => Err(unexpected_event(other)),
        }
    }

    pub async fn update_expense(&self, expense: Expense) -> Result<Expense> {
        match self.apply(Command::UpdateExpense(expense)).await? {
            StoreEvent::ExpenseUpdated { expense } => Ok(expense),
            other => Err(unexpected_event(other)),
        }
    }

    /// Set the category of an uncategorised expense. Returns the stored
    /// expense, whose category is the existing one if it was already set.
    pub async fn categorize(&self, id: Uuid, category: &str) -> Result<Expense> {
        let command = Command::CategorizeIfUnset {
            id,
            category: category.to_string(),
        };
        match self.apply(command).await? {
            StoreEvent::ExpenseUpdated { expense } | StoreEvent::CategoryKept { expense } => {
                Ok(expense)
            }
            other => Err(unexpected_event(other)),
        }
    }

    pub async fn delete_expense(&self, id: Uuid) -> Result<Expense> {
        match self.apply(Command::DeleteExpense(id)).await? {
            StoreEvent::ExpenseDeleted { expense } => Ok(expense),
            other => Err(unexpected_event(other)),
        }
    }
}

fn unexpected_event(event: StoreEvent) -> TrackwiseError {
    TrackwiseError::Validation(format!("Unexpected store event: {:?}", event))
}
