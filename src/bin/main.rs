//! Enumerate action paths from the command line.
//!
//! Usage: `trackwise [actions.json]`. Reads `{"actions": [...]}` from the
//! file, or from stdin when no file is given, and prints `{"paths": [...]}`.

use tokio::io::AsyncReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;
use trackwise::{
    config::AppConfig,
    flows::action_paths::{explore, ExploreActionPathsInput},
    paths::PathEnumerator,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env()?;

    let raw = match std::env::args().nth(1) {
        Some(path) => tokio::fs::read_to_string(&path).await?,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin().read_to_string(&mut buffer).await?;
            buffer
        }
    };

    let input: ExploreActionPathsInput = serde_json::from_str(&raw)?;
    info!(actions = input.actions.len(), "Enumerating action paths");

    let output = explore(&PathEnumerator::new(config.max_actions), &input)?;
    for path in &output.paths {
        info!("{}", path);
    }

    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
