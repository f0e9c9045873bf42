use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use super::schema::{InputSchema, ToolArgs};
use super::{Tool, ToolResult};
use crate::cache::ResponseCache;
use crate::error::McpResult;

pub struct ClearCacheTool {
    cache: Arc<ResponseCache>,
}

impl ClearCacheTool {
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl Tool for ClearCacheTool {
    fn name(&self) -> &str {
        "clear_cache"
    }

    fn description(&self) -> &str {
        "Drop all cached weather and geocoding responses"
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
    }

    async fn execute(&self, _args: ToolArgs) -> McpResult<ToolResult> {
        let before = self.cache.stats().await;
        let cleared = self.cache.clear().await;
        info!(cleared, "response cache cleared");

        let noun = if cleared == 1 { "entry" } else { "entries" };
        Ok(
            ToolResult::text(format!("Cleared {} cached {}.", cleared, noun)).with_structured(
                json!({
                    "cleared": cleared,
                    "hits": before.hits,
                    "misses": before.misses,
                }),
            ),
        )
    }
}
