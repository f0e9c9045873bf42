use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

use crate::config::{ConnectionConfig, LlmConfig};
use crate::error::{McpError, McpResult};
use crate::weather::client::map_request_error;

use super::TextCompletion;

/// Gemini `generateContent` client.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f64,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiClient {
    /// Returns `None` when no API key is configured.
    pub fn from_config(llm: &LlmConfig, connection: &ConnectionConfig) -> McpResult<Option<Self>> {
        let Some(api_key) = llm.api_key.as_deref().filter(|k| !k.trim().is_empty()) else {
            return Ok(None);
        };

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10).min(connection.timeout()))
            .timeout(connection.timeout())
            .build()?;

        Ok(Some(Self {
            http,
            api_key: api_key.to_string(),
            model: llm.model.clone(),
            base_url: llm.base_url.trim_end_matches('/').to_string(),
            max_tokens: llm.max_tokens,
            temperature: llm.temperature,
        }))
    }

    fn api_url(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }

    fn build_request_body(&self, prompt: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "maxOutputTokens": self.max_tokens,
                "temperature": self.temperature,
            }
        })
    }
}

/// Concatenates the text parts of the first candidate.
pub(crate) fn parse_response(json: &Value) -> McpResult<String> {
    let first = json["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| McpError::Provider("no candidates in completion response".to_string()))?;

    let text: String = first["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(McpError::Provider("empty completion".to_string()));
    }
    Ok(text.to_string())
}

#[async_trait]
impl TextCompletion for GeminiClient {
    async fn complete(&self, prompt: &str) -> McpResult<String> {
        let url = self.api_url();
        debug!(model = %self.model, prompt_len = prompt.len(), "completion request");

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_request_body(prompt))
            .send()
            .await
            .map_err(|e| map_request_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error"));
            return Err(McpError::Provider(format!(
                "completion service returned HTTP {}: {}",
                status.as_u16(),
                message
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| McpError::Provider(format!("malformed completion response: {}", e)))?;
        parse_response(&body)
    }
}
