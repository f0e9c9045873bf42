use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::McpError;

/// Typed content block; `text` in the minimal case.
///
/// The weather tools only emit `text`. `image` is accepted so that
/// [`crate::client::McpClient`] can decode results from any MCP server.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// Uniform envelope returned by every tool call.
///
/// `content` is populated on success and on error alike, so callers can
/// render it before looking at `is_error`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
    #[serde(
        rename = "structuredContent",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub structured_content: Option<Value>,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
            structured_content: None,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: true,
            structured_content: None,
        }
    }

    /// Error envelope whose text is the failure reason.
    pub fn from_error(err: &McpError) -> Self {
        let text = match err {
            McpError::NotFound(message) => message.clone(),
            other => other.to_string(),
        };
        Self::error(text).with_structured(json!({ "errorKind": err.kind().as_str() }))
    }

    pub fn with_structured(mut self, payload: Value) -> Self {
        self.structured_content = Some(payload);
        self
    }

    /// All text blocks joined by newlines.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ToolContent::Text { text } => Some(text.as_str()),
                ToolContent::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
