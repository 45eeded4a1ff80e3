//! Environment-driven configuration
//!
//! `.env` is loaded by the binaries via `dotenv`; everything here reads
//! plain process environment so tests can build configs directly.

use crate::error::TrackwiseError;
use crate::models::DEFAULT_INCOME;
use crate::paths::{DEFAULT_MAX_ACTIONS, MAX_ACTIONS_LIMIT};
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub port: u16,
    pub max_actions: usize,
    pub patterns_delay: Duration,
    pub prediction_delay: Duration,
    pub model_timeout: Duration,
    pub default_income: f64,
    /// Serve canned model replies instead of calling Gemini.
    pub mock_model: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            port: DEFAULT_PORT,
            max_actions: DEFAULT_MAX_ACTIONS,
            patterns_delay: Duration::from_millis(700),
            prediction_delay: Duration::from_millis(1000),
            model_timeout: Duration::from_secs(30),
            default_income: DEFAULT_INCOME,
            mock_model: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let port = match env::var("PORT").or_else(|_| env::var("API_PORT")) {
            Ok(raw) => parse_value("PORT", &raw)?,
            Err(_) => defaults.port,
        };

        let default_income: f64 = read_or("TRACKWISE_DEFAULT_INCOME", defaults.default_income)?;
        if !default_income.is_finite() || default_income <= 0.0 {
            return Err(TrackwiseError::Config(
                "TRACKWISE_DEFAULT_INCOME must be a positive number".to_string(),
            ));
        }

        Ok(Self {
            gemini_api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: env::var("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            port,
            max_actions: validate_max_actions(read_or(
                "TRACKWISE_MAX_ACTIONS",
                defaults.max_actions,
            )?)?,
            patterns_delay: Duration::from_millis(read_or(
                "TRACKWISE_PATTERNS_DELAY_MS",
                defaults.patterns_delay.as_millis() as u64,
            )?),
            prediction_delay: Duration::from_millis(read_or(
                "TRACKWISE_PREDICTION_DELAY_MS",
                defaults.prediction_delay.as_millis() as u64,
            )?),
            model_timeout: Duration::from_secs(read_or(
                "TRACKWISE_MODEL_TIMEOUT_SECS",
                defaults.model_timeout.as_secs(),
            )?),
            default_income,
            mock_model: env::var("TRACKWISE_MOCK_MODEL")
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
        })
    }

    pub fn has_api_key(&self) -> bool {
        !self.gemini_api_key.trim().is_empty() && self.gemini_api_key != "your_gemini_api_key_here"
    }
}

fn validate_max_actions(max_actions: usize) -> Result<usize> {
    if max_actions > MAX_ACTIONS_LIMIT {
        return Err(TrackwiseError::Config(format!(
            "TRACKWISE_MAX_ACTIONS must be at most {}, got {}",
            MAX_ACTIONS_LIMIT, max_actions
        )));
    }
    Ok(max_actions)
}

fn read_or<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| TrackwiseError::Config(format!("{} has an invalid value: {:?}", key, raw)))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
