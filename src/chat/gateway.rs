use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::McpClient;
use crate::llm::TextCompletion;
use crate::mcp::types::ToolResult;
use crate::utils::clean_model_reply;

use super::intent::{DEFAULT_FORECAST_DAYS, Intent, classify, extract_city_heuristic};

pub const HELP_TEXT: &str = "I'm a weather assistant. Ask me things like \"What's the weather in Paris?\" \
or \"3-day forecast for Tokyo in fahrenheit\" and I'll look it up for you.";

const ASK_FOR_CITY: &str =
    "I can check the weather for you. Which city are you interested in?";

const SERVICE_UNAVAILABLE: &str =
    "Sorry, I couldn't reach the weather service right now. Please try again in a moment.";

// Recent turns included in chat prompts
const HISTORY_WINDOW: usize = 6;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Reply body for the chat endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatReply {
    pub response: String,
    #[serde(rename = "weatherData", skip_serializing_if = "Option::is_none")]
    pub weather_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatReply {
    fn text(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            weather_data: None,
            error: None,
        }
    }

    fn failed(response: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            weather_data: None,
            error: Some(error.into()),
        }
    }

    /// Turn a tool envelope into a reply. Error envelopes keep their text and
    /// report their error kind.
    pub fn from_tool_result(result: ToolResult) -> Self {
        let response = result.text_content();
        if result.is_error {
            let kind = result
                .structured_content
                .as_ref()
                .and_then(|s| s.get("errorKind"))
                .and_then(Value::as_str)
                .unwrap_or("tool_error")
                .to_string();
            return Self::failed(response, kind);
        }

        Self {
            response,
            weather_data: result.structured_content,
            error: None,
        }
    }
}

/// Answers chat messages, routing weather questions to the MCP tools.
pub struct ChatGateway {
    client: Arc<McpClient>,
    completion: Option<Arc<dyn TextCompletion>>,
}

impl ChatGateway {
    pub fn new(client: Arc<McpClient>, completion: Option<Arc<dyn TextCompletion>>) -> Self {
        Self { client, completion }
    }

    pub fn client(&self) -> &Arc<McpClient> {
        &self.client
    }

    pub async fn respond(&self, message: &str, history: &[ChatMessage]) -> ChatReply {
        let message = message.trim();
        if message.is_empty() {
            return ChatReply::failed("Please type a message to get started.", "empty message");
        }

        let intent = classify(message);
        debug!(?intent, "classified chat message");

        if intent.is_weather {
            self.weather_reply(message, &intent).await
        } else {
            self.chat_reply(message, history).await
        }
    }

    async fn weather_reply(&self, message: &str, intent: &Intent) -> ChatReply {
        let Some(city) = self.extract_city(message).await else {
            return ChatReply::text(ASK_FOR_CITY);
        };
        let units = intent.units.unwrap_or_default();

        let (tool, arguments) = if intent.wants_forecast {
            (
                "get_forecast",
                json!({
                    "city": city,
                    "days": intent.days.unwrap_or(DEFAULT_FORECAST_DAYS),
                    "units": units.as_str(),
                }),
            )
        } else {
            ("get_weather", json!({ "city": city, "units": units.as_str() }))
        };

        info!(tool, city = %city, "weather request from chat");
        match self.client.call_tool(tool, arguments).await {
            Ok(result) => ChatReply::from_tool_result(result),
            Err(e) => {
                warn!(tool, kind = e.kind().as_str(), "tool call failed: {}", e);
                ChatReply::failed(SERVICE_UNAVAILABLE, e.to_string())
            }
        }
    }

    /// Ask the completion service for the city, falling back to the keyword
    /// heuristic when it is missing, fails, or answers NONE.
    pub async fn extract_city(&self, message: &str) -> Option<String> {
        if let Some(completion) = &self.completion {
            let prompt = format!(
                "Extract the city or place name from this weather question. \
                 Reply with only the place name, or NONE if there is none.\n\nQuestion: {}",
                message
            );
            match completion.complete(&prompt).await {
                Ok(reply) => match clean_model_reply(&reply) {
                    Some(city) if !city.eq_ignore_ascii_case("none") => return Some(city),
                    _ => debug!("completion found no city, using heuristic"),
                },
                Err(e) => warn!("city extraction failed, using heuristic: {}", e),
            }
        }

        extract_city_heuristic(message)
    }

    async fn chat_reply(&self, message: &str, history: &[ChatMessage]) -> ChatReply {
        let Some(completion) = &self.completion else {
            return ChatReply::text(HELP_TEXT);
        };

        match completion.complete(&chat_prompt(message, history)).await {
            Ok(reply) if !reply.trim().is_empty() => ChatReply::text(reply.trim()),
            Ok(_) => ChatReply::text(HELP_TEXT),
            Err(e) => {
                warn!("chat completion failed: {}", e);
                ChatReply::text(HELP_TEXT)
            }
        }
    }
}

fn chat_prompt(message: &str, history: &[ChatMessage]) -> String {
    let mut prompt = String::from(
        "You are a friendly weather assistant. Answer briefly. If the user asks \
         about something other than weather, help if you can and mention that you \
         can look up current weather and forecasts for any city.\n\n",
    );

    let start = history.len().saturating_sub(HISTORY_WINDOW);
    for turn in &history[start..] {
        let _ = writeln!(prompt, "{}: {}", turn.role, turn.content);
    }
    let _ = write!(prompt, "user: {}\nassistant:", message);
    prompt
}
