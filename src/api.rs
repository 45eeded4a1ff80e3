//! REST API server for TrackWise
//!
//! Exposes the store, the analysis views, the path enumerator and the chat
//! assistant as JSON endpoints for the browser front-end.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use uuid::Uuid;

use crate::chat::{resolve_session_id, validate_question, ChatMessage, ChatSessions};
use crate::error::TrackwiseError;
use crate::flows::action_paths::{explore, ExploreActionPathsInput};
use crate::insights::InsightsService;
use crate::models::Expense;
use crate::paths::PathEnumerator;
use crate::views::{format_currency, SpendingSummary};

const MODEL_UNAVAILABLE: &str = "The assistant is unavailable right now. Please try again later.";

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct IncomeRequest {
    pub income: f64,
}

#[derive(Debug, Deserialize)]
pub struct AddExpenseRequest {
    pub description: String,
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateExpenseRequest {
    pub description: String,
    pub amount: f64,
    pub category: Option<String>,
    /// Keeps the stored date when absent.
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct PredictionPeriodRequest {
    pub period: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ChatReply {
    session_id: Uuid,
    reply: ChatMessage,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

type Reply = (StatusCode, Json<ApiResponse>);

fn ok<T: Serialize>(data: T) -> Reply {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

/// Map a domain error onto a status code and client-safe message.
fn failure(err: TrackwiseError) -> Reply {
    let status = match &err {
        TrackwiseError::Validation(_)
        | TrackwiseError::UuidError(_)
        | TrackwiseError::SerializationError(_) => StatusCode::BAD_REQUEST,
        TrackwiseError::NotFound(_) => StatusCode::NOT_FOUND,
        TrackwiseError::ActionLimitExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        TrackwiseError::ChatBusy => StatusCode::CONFLICT,
        e if e.is_model_failure() => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = if status == StatusCode::BAD_GATEWAY {
        error!("Model failure: {}", err);
        MODEL_UNAVAILABLE.to_string()
    } else if status.is_server_error() {
        error!("Request failed: {}", err);
        "Internal server error".to_string()
    } else {
        err.to_string()
    };

    (status, Json(ApiResponse::error(message)))
}

fn respond<T: Serialize>(result: crate::Result<T>) -> Reply {
    match result {
        Ok(data) => ok(data),
        Err(e) => failure(e),
    }
}

fn parse_id(id: &str) -> crate::Result<Uuid> {
    Ok(Uuid::parse_str(id)?)
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct AppState {
    pub insights: Arc<InsightsService>,
    pub chats: Arc<ChatSessions>,
    pub enumerator: PathEnumerator,
}

impl AppState {
    pub fn new(insights: Arc<InsightsService>, enumerator: PathEnumerator) -> Self {
        Self {
            insights,
            chats: Arc::new(ChatSessions::new()),
            enumerator,
        }
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "model": state.insights.adapter().model_name(),
        "timestamp": Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Income & Expenses
/// =============================

async fn get_state(State(state): State<AppState>) -> Reply {
    ok(state.insights.store().snapshot().await)
}

async fn put_income(State(state): State<AppState>, Json(req): Json<IncomeRequest>) -> Reply {
    let store = state.insights.store();
    respond(store.set_income(req.income).await.map(|()| {
        serde_json::json!({
            "income": req.income,
            "formatted": format_currency(Some(req.income)),
        })
    }))
}

async fn list_expenses(State(state): State<AppState>) -> Reply {
    ok(state.insights.store().snapshot().await.expenses)
}

async fn add_expense(State(state): State<AppState>, Json(req): Json<AddExpenseRequest>) -> Reply {
    info!("Adding expense: {}", req.description);

    match state.insights.add_expense(&req.description, req.amount).await {
        Ok(added) => (StatusCode::CREATED, Json(ApiResponse::success(added))),
        Err(e) => failure(e),
    }
}

async fn update_expense(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateExpenseRequest>,
) -> Reply {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(e) => return failure(e),
    };

    let store = state.insights.store();
    let Some(existing) = store.expense(id).await else {
        return failure(TrackwiseError::NotFound(format!("Expense {} not found", id)));
    };

    respond(
        store
            .update_expense(Expense {
                id,
                description: req.description,
                amount: req.amount,
                category: req.category,
                date: req.date.unwrap_or(existing.date),
            })
            .await,
    )
}

async fn delete_expense(State(state): State<AppState>, Path(id): Path<String>) -> Reply {
    match parse_id(&id) {
        Ok(id) => respond(state.insights.store().delete_expense(id).await),
        Err(e) => failure(e),
    }
}

/// =============================
/// Analysis Views
/// =============================

async fn summary(State(state): State<AppState>) -> Reply {
    let snapshot = state.insights.store().snapshot().await;
    let summary = SpendingSummary::from_snapshot(&snapshot);

    ok(serde_json::json!({
        "formatted": {
            "income": format_currency(summary.income),
            "total_spent": format_currency(Some(summary.total_spent)),
            "remaining": format_currency(summary.remaining),
        },
        "summary": summary,
    }))
}

async fn insights(State(state): State<AppState>) -> Reply {
    ok(serde_json::json!({ "insights": state.insights.summary_insights().await }))
}

async fn patterns(State(state): State<AppState>) -> Reply {
    ok(state.insights.patterns())
}

async fn prediction(State(state): State<AppState>) -> Reply {
    ok(serde_json::json!({
        "period": state.insights.prediction_period(),
        "view": state.insights.prediction(),
    }))
}

async fn put_prediction_period(
    State(state): State<AppState>,
    Json(req): Json<PredictionPeriodRequest>,
) -> Reply {
    respond(
        state
            .insights
            .set_prediction_period(&req.period)
            .await
            .map(|()| serde_json::json!({ "period": state.insights.prediction_period() })),
    )
}

/// =============================
/// Action Paths
/// =============================

async fn explore_paths(
    State(state): State<AppState>,
    Json(req): Json<ExploreActionPathsInput>,
) -> Reply {
    info!(actions = req.actions.len(), "Exploring action paths");
    respond(explore(&state.enumerator, &req))
}

/// =============================
/// Chat Endpoints
/// =============================

async fn chat_handler(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Reply {
    // Rejected messages must not register a session.
    let question = match validate_question(&req.message) {
        Ok(question) => question,
        Err(e) => return failure(e),
    };

    let session_id = resolve_session_id(req.session_id.as_deref());
    let session = state.chats.session(session_id).await;
    let snapshot = state.insights.store().snapshot().await;

    respond(
        session
            .send(state.insights.adapter(), &snapshot, question)
            .await
            .map(|reply| ChatReply { session_id, reply }),
    )
}

async fn chat_transcript(State(state): State<AppState>, Path(session_id): Path<String>) -> Reply {
    let session_id = resolve_session_id(Some(&session_id));

    match state.chats.get(session_id).await {
        Some(session) => ok(session.transcript()),
        None => failure(TrackwiseError::NotFound(format!(
            "Chat session {} not found",
            session_id
        ))),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/state", get(get_state))
        .route("/api/income", put(put_income))
        .route("/api/expenses", get(list_expenses).post(add_expense))
        .route("/api/expenses/:id", put(update_expense).delete(delete_expense))
        .route("/api/summary", get(summary))
        .route("/api/insights", get(insights))
        .route("/api/patterns", get(patterns))
        .route("/api/prediction", get(prediction))
        .route("/api/prediction/period", put(put_prediction_period))
        .route("/api/paths", post(explore_paths))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/:session_id", get(chat_transcript))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: AppState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::testing::ScriptedModel;
    use crate::flows::PromptAdapter;
    use crate::llm::{LanguageModel, MockLanguageModel};
    use crate::store::FinanceStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app_with(model: Arc<dyn LanguageModel>) -> (Router, AppState) {
        let store = Arc::new(FinanceStore::new(Some(10_000.0)));
        let insights = Arc::new(InsightsService::new(
            store,
            PromptAdapter::new(model),
            Duration::from_millis(700),
            Duration::from_millis(1000),
        ));
        let state = AppState::new(insights, PathEnumerator::new(4));
        (create_router(state.clone()), state)
    }

    fn app() -> Router {
        app_with(Arc::new(MockLanguageModel)).0
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model"], "mock");
    }

    #[tokio::test]
    async fn test_income_round_trip() {
        let app = app();

        let (status, body) = call(&app, "PUT", "/api/income", Some(json!({ "income": 4200.5 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["formatted"], "$4,200.50");

        let (_, state) = call(&app, "GET", "/api/state", None).await;
        assert_eq!(state["data"]["income"], 4200.5);

        let (status, body) = call(&app, "PUT", "/api/income", Some(json!({ "income": -1 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_expense_lifecycle() {
        let app = app();

        let (status, body) = call(
            &app,
            "POST",
            "/api/expenses",
            Some(json!({ "description": "Uber to airport", "amount": 38.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["expense"]["category"], "Transportation");
        let id = body["data"]["expense"]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            "PUT",
            &format!("/api/expenses/{}", id),
            Some(json!({ "description": "Taxi to airport", "amount": 41.0, "category": "Travel" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["amount"], 41.0);
        assert_eq!(body["data"]["category"], "Travel");

        let (_, list) = call(&app, "GET", "/api/expenses", None).await;
        assert_eq!(list["data"].as_array().unwrap().len(), 1);

        let (status, _) = call(&app, "DELETE", &format!("/api/expenses/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, "DELETE", &format!("/api/expenses/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&app, "DELETE", "/api/expenses/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_invalid_expense_rejected() {
        let (status, body) = call(
            &app(),
            "POST",
            "/api/expenses",
            Some(json!({ "description": " ", "amount": 5.0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Description is required"));
    }

    #[tokio::test]
    async fn test_summary_formats_totals() {
        let app = app();
        for (description, amount) in [("Groceries", 120.0), ("Coffee", 4.5)] {
            call(
                &app,
                "POST",
                "/api/expenses",
                Some(json!({ "description": description, "amount": amount })),
            )
            .await;
        }

        let (status, body) = call(&app, "GET", "/api/summary", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["summary"]["total_spent"], 124.5);
        assert_eq!(body["data"]["formatted"]["remaining"], "$9,875.50");
        assert_eq!(body["data"]["summary"]["by_category"][0]["category"], "Food");
    }

    #[tokio::test]
    async fn test_paths_endpoint() {
        let app = app();

        let (status, body) = call(
            &app,
            "POST",
            "/api/paths",
            Some(json!({
                "actions": [
                    { "name": "Budget", "description": "Write a monthly budget" },
                    { "name": "Invest", "description": "Open an index fund" }
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["paths"].as_array().unwrap().len(), 4);

        let actions: Vec<Value> = (0..5)
            .map(|i| json!({ "name": format!("a{}", i), "description": "" }))
            .collect();
        let (status, _) = call(&app, "POST", "/api/paths", Some(json!({ "actions": actions }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_views_start_idle_or_insufficient() {
        let (app, state) = app_with(Arc::new(MockLanguageModel));
        state.insights.refresh().await;

        let (_, patterns) = call(&app, "GET", "/api/patterns", None).await;
        assert_eq!(patterns["data"]["status"], "insufficient");

        let (status, body) = call(
            &app,
            "PUT",
            "/api/prediction/period",
            Some(json!({ "period": "next 3 months" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["period"], "next 3 months");

        let (_, prediction) = call(&app, "GET", "/api/prediction", None).await;
        assert_eq!(prediction["data"]["period"], "next 3 months");
        assert_eq!(prediction["data"]["view"]["status"], "insufficient");
    }

    #[tokio::test]
    async fn test_chat_round_trip() {
        let app = app();

        let (status, body) = call(
            &app,
            "POST",
            "/api/chat",
            Some(json!({ "session_id": "kitchen-table", "message": "Can I afford a holiday?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["reply"]["role"], "bot");
        let session_id = body["data"]["session_id"].as_str().unwrap().to_string();

        let (status, transcript) = call(&app, "GET", "/api/chat/kitchen-table", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(transcript["data"]["session_id"], session_id.as_str());
        assert_eq!(transcript["data"]["messages"].as_array().unwrap().len(), 2);

        let (status, _) = call(&app, "POST", "/api/chat", Some(json!({ "message": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "GET", "/api/chat/unknown-session", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rejected_chat_registers_no_session() {
        let (app, state) = app_with(Arc::new(MockLanguageModel));

        for body in [
            json!({ "message": "   " }),
            json!({ "session_id": "kitchen-table", "message": "" }),
        ] {
            let (status, reply) = call(&app, "POST", "/api/chat", Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(reply["success"], false);
        }

        assert_eq!(state.chats.len().await, 0);
        let (status, _) = call(&app, "GET", "/api/chat/kitchen-table", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_model_failure_is_generic() {
        let model = ScriptedModel::failing("API key invalid: sk-123");
        let (app, state) = app_with(model);
        state
            .insights
            .store()
            .add_expense(crate::models::NewExpense::new("Rent", 900.0))
            .await
            .unwrap();

        let (status, body) = call(&app, "GET", "/api/insights", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["data"]["insights"][0],
            crate::insights::INSIGHTS_FAILURE
        );

        let err = failure(TrackwiseError::LlmError("API key invalid: sk-123".to_string()));
        assert_eq!(err.0, StatusCode::BAD_GATEWAY);
        assert_eq!(err.1 .0.error.as_deref(), Some(MODEL_UNAVAILABLE));
    }
}
