//! Gemini API client
//!
//! Uses a long-lived reqwest::Client for connection pooling.

use crate::config::AppConfig;
use crate::error::TrackwiseError;
use crate::llm::{LanguageModel, ModelRequest};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: &str, timeout: Duration) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            endpoint: format!("{}/{}:generateContent", GEMINI_BASE_URL, model),
        })
    }

    pub fn from_config(config: &AppConfig) -> crate::Result<Self> {
        Self::new(
            config.gemini_api_key.clone(),
            &config.gemini_model,
            config.model_timeout,
        )
    }

    /// Point the client at another endpoint (proxies, test servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn complete(&self, request: &ModelRequest) -> crate::Result<String> {
        if self.api_key.trim().is_empty() {
            return Err(TrackwiseError::Config(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let body = build_request(request);

        info!(flow = request.flow, "Calling Gemini API");

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(flow = request.flow, "Gemini API request failed: {}", e);
                TrackwiseError::LlmError(format!("Gemini API error: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(flow = request.flow, %status, "Gemini API error response: {}", error_text);
            return Err(TrackwiseError::LlmError(format!(
                "Gemini API returned {}: {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            TrackwiseError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        let (answer, finish_reason) = extract_answer(gemini_response)?;

        debug!(
            flow = request.flow,
            finish_reason = finish_reason.as_deref().unwrap_or("unknown"),
            answer_len = answer.len(),
            "Gemini response received"
        );

        Ok(answer)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

fn build_request(request: &ModelRequest) -> GeminiRequest {
    GeminiRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: vec![Part {
                text: request.prompt.clone(),
            }],
        }],
        generation_config: GenerationConfig {
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 2048,
            response_mime_type: request.json.then(|| "application/json".to_string()),
        },
        system_instruction: SystemInstruction {
            parts: vec![Part {
                text: request.system.clone(),
            }],
        },
    }
}

/// Concatenate the text parts of the first candidate.
fn extract_answer(response: GeminiResponse) -> crate::Result<(String, Option<String>)> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| TrackwiseError::ModelDeclined("No candidates from Gemini".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(TrackwiseError::ModelDeclined(format!(
            "Empty response from Gemini (finish reason: {})",
            candidate.finish_reason.as_deref().unwrap_or("unknown")
        )));
    }

    Ok((text, candidate.finish_reason))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(json: bool) -> ModelRequest {
        ModelRequest {
            flow: "categorize_expense",
            system: "You are a financial assistant".to_string(),
            prompt: "Categorize: Coffee".to_string(),
            input: json!({ "description": "Coffee" }),
            json,
        }
    }

    #[test]
    fn test_request_serialization() {
        let value = serde_json::to_value(build_request(&request(true))).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "Categorize: Coffee");
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(
            value["systemInstruction"]["parts"][0]["text"],
            "You are a financial assistant"
        );
    }

    #[test]
    fn test_plain_request_omits_mime_type() {
        let value = serde_json::to_value(build_request(&request(false))).unwrap();
        assert!(value["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_extract_answer_joins_parts() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"category\":" }, { "text": "\"Food\"}" }] },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();

        let (text, finish) = extract_answer(response).unwrap();
        assert_eq!(text, "{\"category\":\"Food\"}");
        assert_eq!(finish.as_deref(), Some("STOP"));
    }

    #[test]
    fn test_extract_answer_rejects_empty() {
        let response: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        }))
        .unwrap();
        let err = extract_answer(response).unwrap_err();
        assert!(matches!(err, TrackwiseError::ModelDeclined(_)));

        let none: GeminiResponse = serde_json::from_value(json!({})).unwrap();
        assert!(extract_answer(none).is_err());
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = GeminiClient::new(String::new(), "gemini-2.0-flash", Duration::from_secs(5))
            .unwrap();
        let err = client.complete(&request(true)).await.unwrap_err();
        assert!(err.to_string().to_lowercase().contains("api_key"));
    }
}
