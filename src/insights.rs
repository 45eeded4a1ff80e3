//! Insights service
//!
//! Connects the finance store to the model-backed views. Pattern analysis and
//! budget prediction refresh on their own after the data settles; summary
//! insights and categorisation run on demand.

use crate::config::AppConfig;
use crate::debounce::{Debouncer, ViewState};
use crate::error::TrackwiseError;
use crate::flows::{
    AnalyzeSpendingPatterns, CategorizeExpense, CategorizeExpenseInput, CategoryPrediction,
    PredictBudget, PredictBudgetOutput, PromptAdapter, SpendingInsights,
};
use crate::models::{Expense, NewExpense, CATEGORY_OTHER, CATEGORY_UNCATEGORIZED};
use crate::store::{FinanceSnapshot, FinanceStore};
use crate::views::{
    fingerprint, format_currency, insights_input, patterns_input, prediction_input,
    sorted_category_predictions, DEFAULT_PREDICTION_PERIOD, MIN_EXPENSES_FOR_PATTERNS,
    MIN_EXPENSES_FOR_PREDICTION,
};
use crate::Result;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const PATTERNS_FAILURE: &str = "Could not analyze spending patterns. Please try again later.";
pub const PREDICTION_FAILURE: &str = "Could not generate budget prediction. Please try again later.";
pub const INSIGHTS_FAILURE: &str = "Failed to generate insights. Please try again later.";
pub const CATEGORIZE_FAILURE_NOTICE: &str = "Could not auto-categorize. Set to 'Uncategorized'.";
pub const REMOVED_BEFORE_CATEGORIZE_NOTICE: &str =
    "Expense was removed before it could be categorized.";

const ZERO_PREDICTION_CAVEAT: &str =
    "Prediction might be zero due to limited or inconsistent historical data.";

/// Prediction as shown to the client.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BudgetPrediction {
    pub period: String,
    pub predicted_total_spending: f64,
    pub formatted_total: String,
    /// Largest first.
    pub category_predictions: Vec<CategoryPrediction>,
    pub confidence_note: Option<String>,
    pub caveat: Option<String>,
}

impl BudgetPrediction {
    pub fn from_output(period: String, output: PredictBudgetOutput) -> Self {
        let already_explained = output
            .confidence_note
            .as_deref()
            .map_or(false, |note| note.contains("Insufficient data"));

        let caveat = (output.predicted_total_spending == 0.0 && !already_explained)
            .then(|| ZERO_PREDICTION_CAVEAT.to_string());

        Self {
            period,
            predicted_total_spending: output.predicted_total_spending,
            formatted_total: format_currency(Some(output.predicted_total_spending)),
            category_predictions: sorted_category_predictions(&output.category_predictions),
            confidence_note: output.confidence_note,
            caveat,
        }
    }
}

/// Result of adding an expense through the service.
#[derive(Debug, Clone, Serialize)]
pub struct CategorizedExpense {
    pub expense: Expense,
    pub notice: String,
}

/// Last payload handed to one debounced view.
///
/// The lock around it is held from the dispatch decision until the job is
/// queued, so the recorded fingerprint always belongs to the latest trigger.
#[derive(Default)]
struct Dispatched {
    revision: u64,
    fingerprint: Option<String>,
}

impl Dispatched {
    /// Snapshots older than one already handled are ignored.
    fn is_stale(&self, revision: u64) -> bool {
        revision < self.revision
    }

    fn clear(&mut self, revision: u64) {
        self.revision = revision;
        self.fingerprint = None;
    }

    /// Record `fp` as dispatched. Returns false when it matches the last
    /// dispatch and that dispatch is not being retried.
    fn should_dispatch(&mut self, revision: u64, fp: String, retry: bool) -> bool {
        self.revision = revision;
        if !retry && self.fingerprint.as_deref() == Some(fp.as_str()) {
            return false;
        }
        self.fingerprint = Some(fp);
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct InsightsService {
    store: Arc<FinanceStore>,
    adapter: PromptAdapter,
    patterns: Debouncer<Vec<String>>,
    prediction: Debouncer<BudgetPrediction>,
    prediction_period: Mutex<String>,
    patterns_sent: Mutex<Dispatched>,
    prediction_sent: Mutex<Dispatched>,
}

impl InsightsService {
    pub fn new(
        store: Arc<FinanceStore>,
        adapter: PromptAdapter,
        patterns_delay: Duration,
        prediction_delay: Duration,
    ) -> Self {
        Self {
            store,
            adapter,
            patterns: Debouncer::new("patterns", patterns_delay, PATTERNS_FAILURE),
            prediction: Debouncer::new("prediction", prediction_delay, PREDICTION_FAILURE),
            prediction_period: Mutex::new(DEFAULT_PREDICTION_PERIOD.to_string()),
            patterns_sent: Mutex::new(Dispatched::default()),
            prediction_sent: Mutex::new(Dispatched::default()),
        }
    }

    pub fn from_config(store: Arc<FinanceStore>, adapter: PromptAdapter, config: &AppConfig) -> Self {
        Self::new(store, adapter, config.patterns_delay, config.prediction_delay)
    }

    pub fn store(&self) -> &Arc<FinanceStore> {
        &self.store
    }

    pub fn adapter(&self) -> &PromptAdapter {
        &self.adapter
    }

    pub fn patterns(&self) -> ViewState<Vec<String>> {
        self.patterns.current()
    }

    pub fn prediction(&self) -> ViewState<BudgetPrediction> {
        self.prediction.current()
    }

    pub fn prediction_period(&self) -> String {
        lock(&self.prediction_period).clone()
    }

    /// Re-evaluate both views on every store revision.
    ///
    /// The task lives as long as the store; abort the handle to stop it.
    pub fn spawn_watcher(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let mut revisions = self.store.subscribe();

        tokio::spawn(async move {
            service.refresh().await;
            while revisions.changed().await.is_ok() {
                let revision = *revisions.borrow_and_update();
                debug!(revision, "Refreshing analysis views");
                service.refresh().await;
            }
        })
    }

    pub async fn refresh(&self) {
        let snapshot = self.store.snapshot().await;
        self.refresh_patterns(&snapshot);
        self.refresh_prediction(&snapshot);
    }

    pub async fn set_prediction_period(&self, period: &str) -> Result<()> {
        let period = period.trim();
        if period.is_empty() {
            return Err(TrackwiseError::Validation(
                "Prediction period must not be blank.".to_string(),
            ));
        }

        *lock(&self.prediction_period) = period.to_string();
        info!(period, "Prediction period changed");

        let snapshot = self.store.snapshot().await;
        self.refresh_prediction(&snapshot);
        Ok(())
    }

    fn refresh_patterns(&self, snapshot: &FinanceSnapshot) {
        let mut sent = lock(&self.patterns_sent);
        if sent.is_stale(snapshot.revision) {
            debug!(revision = snapshot.revision, "Skipping stale pattern refresh");
            return;
        }

        let available = snapshot.expenses.len();
        if available < MIN_EXPENSES_FOR_PATTERNS {
            sent.clear(snapshot.revision);
            self.patterns.set_state(ViewState::Insufficient {
                required: MIN_EXPENSES_FOR_PATTERNS,
                available,
            });
            return;
        }

        let input = patterns_input(snapshot);
        let failed = matches!(self.patterns.current(), ViewState::Failed(_));
        if !sent.should_dispatch(snapshot.revision, fingerprint(&input), failed) {
            debug!("Pattern payload unchanged, skipping");
            return;
        }

        let adapter = self.adapter.clone();
        self.patterns.trigger(move || async move {
            let output = adapter.run::<AnalyzeSpendingPatterns>(&input).await?;
            Ok(output.patterns)
        });
    }

    fn refresh_prediction(&self, snapshot: &FinanceSnapshot) {
        let mut sent = lock(&self.prediction_sent);
        if sent.is_stale(snapshot.revision) {
            debug!(revision = snapshot.revision, "Skipping stale prediction refresh");
            return;
        }

        let available = snapshot.expenses.len();
        if available < MIN_EXPENSES_FOR_PREDICTION {
            sent.clear(snapshot.revision);
            self.prediction.set_state(ViewState::Insufficient {
                required: MIN_EXPENSES_FOR_PREDICTION,
                available,
            });
            return;
        }

        let period = self.prediction_period();
        let input = prediction_input(snapshot, &period);
        let failed = matches!(self.prediction.current(), ViewState::Failed(_));
        if !sent.should_dispatch(snapshot.revision, fingerprint(&input), failed) {
            debug!("Prediction payload unchanged, skipping");
            return;
        }

        let adapter = self.adapter.clone();
        self.prediction.trigger(move || async move {
            let output = adapter.run::<PredictBudget>(&input).await?;
            Ok(BudgetPrediction::from_output(period, output))
        });
    }

    /// AI insights for the current summary. Failures collapse to a single
    /// apologetic insight rather than an error.
    pub async fn summary_insights(&self) -> Vec<String> {
        let snapshot = self.store.snapshot().await;
        if snapshot.expenses.is_empty() {
            return Vec::new();
        }

        match self.adapter.run::<SpendingInsights>(&insights_input(&snapshot)).await {
            Ok(output) => output.insights,
            Err(e) => {
                warn!("Summary insights failed: {}", e);
                vec![INSIGHTS_FAILURE.to_string()]
            }
        }
    }

    /// Add an expense, then categorise it. The expense is stored before the
    /// model is asked, so a failed categorisation never loses it. A category
    /// the user sets while the model is working is kept.
    pub async fn add_expense(&self, description: &str, amount: f64) -> Result<CategorizedExpense> {
        let expense = self
            .store
            .add_expense(NewExpense::new(description, amount))
            .await?;

        let input = CategorizeExpenseInput {
            description: expense.description.clone(),
        };

        let (category, notice) = match self.adapter.run::<CategorizeExpense>(&input).await {
            Ok(output) => {
                let category = output
                    .category
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| CATEGORY_OTHER.to_string());
                let notice = format!("Auto-categorized as: {}.", category);
                (category, notice)
            }
            Err(e) => {
                warn!(expense_id = %expense.id, "Categorization failed: {}", e);
                (
                    CATEGORY_UNCATEGORIZED.to_string(),
                    CATEGORIZE_FAILURE_NOTICE.to_string(),
                )
            }
        };

        let stored = match self.store.categorize(expense.id, &category).await {
            Ok(stored) => stored,
            Err(TrackwiseError::NotFound(_)) => {
                info!(expense_id = %expense.id, "Expense removed before categorization");
                return Ok(CategorizedExpense {
                    expense,
                    notice: REMOVED_BEFORE_CATEGORIZE_NOTICE.to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let notice = match stored.category.as_deref() {
            Some(kept) if kept != category => format!("Kept category: {}.", kept),
            _ => notice,
        };
        info!(expense_id = %stored.id, category = ?stored.category, "Expense added");

        Ok(CategorizedExpense {
            expense: stored,
            notice,
        })
    }
}
