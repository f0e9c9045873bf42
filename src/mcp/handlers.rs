use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::McpResult;
use crate::llm::{GeminiClient, NarrativeRenderer, TextCompletion};
use crate::tools::{ToolRegistry, cache as cache_tools, weather};
use crate::weather::{OpenMeteoClient, WeatherService, WeatherSource};

use super::types::{Tool as McpTool, ToolResult};

/// Owns the tool registry served over every MCP transport.
pub struct RequestHandler {
    registry: ToolRegistry,
    cache: Arc<ResponseCache>,
}

macro_rules! register_tool {
    ($registry:expr, $($tool:expr),+ $(,)?) => {
        $( $registry.register($tool)?; )+
    };
}

impl RequestHandler {
    pub fn new(
        cache: Arc<ResponseCache>,
        source: Arc<dyn WeatherSource>,
        completion: Option<Arc<dyn TextCompletion>>,
    ) -> McpResult<Self> {
        if completion.is_none() {
            warn!("No completion service configured; weather narratives use templates only");
        }

        let service = Arc::new(WeatherService::new(source, cache.clone()));
        let renderer = NarrativeRenderer::new(completion);

        let mut registry = ToolRegistry::new();

        // Weather tools
        register_tool!(
            registry,
            weather::GetWeatherTool::new(service.clone(), renderer.clone()),
            weather::GetForecastTool::new(service.clone(), renderer.clone()),
            weather::GetWeatherByCoordinatesTool::new(service.clone(), renderer),
            weather::GeocodeCityTool::new(service),
        );

        // Ops tool
        register_tool!(registry, cache_tools::ClearCacheTool::new(cache.clone()));

        info!(tools = registry.len(), "tool registry ready");
        Ok(Self { registry, cache })
    }

    /// Build the handler and its providers from configuration.
    pub fn from_config(config: &Config) -> McpResult<Self> {
        let cache = Arc::new(ResponseCache::from_config(&config.cache));
        let source: Arc<dyn WeatherSource> =
            Arc::new(OpenMeteoClient::new(&config.weather, &config.connection)?);
        let completion = GeminiClient::from_config(&config.llm, &config.connection)?
            .map(|client| Arc::new(client) as Arc<dyn TextCompletion>);

        Self::new(cache, source, completion)
    }

    pub fn list_tools(&self) -> Vec<McpTool> {
        self.registry.list()
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> ToolResult {
        self.registry.call(name, arguments).await
    }

    pub fn tool_count(&self) -> usize {
        self.registry.len()
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }
}
