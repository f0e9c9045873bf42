pub mod gemini;
pub mod narrative;

use crate::error::McpResult;
use async_trait::async_trait;

pub use gemini::GeminiClient;
pub use narrative::{Narrative, NarrativeRenderer, NarrativeSource};

/// Prompt in, text out. Fails on quota, auth or timeout problems.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> McpResult<String>;
}
