use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use trackwise::{
    api::{start_server, AppState},
    config::AppConfig,
    flows::PromptAdapter,
    insights::InsightsService,
    llm::{GeminiClient, LanguageModel, MockLanguageModel},
    paths::PathEnumerator,
    store::FinanceStore,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    info!("TrackWise - API Server");
    info!("Port: {}", config.port);

    let model: Arc<dyn LanguageModel> = if config.mock_model {
        info!("Using mock language model");
        Arc::new(MockLanguageModel)
    } else {
        if !config.has_api_key() {
            warn!("GEMINI_API_KEY not set in .env; model-backed features will fail");
        }
        info!("Using Gemini model {}", config.gemini_model);
        Arc::new(GeminiClient::from_config(&config)?)
    };

    // Create components
    let store = Arc::new(FinanceStore::new(Some(config.default_income)));
    let adapter = PromptAdapter::new(model);
    let insights = Arc::new(InsightsService::from_config(store, adapter, &config));
    let _watcher = insights.spawn_watcher();

    let state = AppState::new(insights, PathEnumerator::new(config.max_actions));

    info!("Services initialized");
    info!("Starting API server...");

    start_server(state, config.port).await?;

    Ok(())
}
