use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// Default configuration constants
const DEFAULT_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
const DEFAULT_REQUESTS_PER_SECOND: u32 = 10;
const DEFAULT_LLM_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_LLM_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_LLM_MAX_TOKENS: u32 = 512;
const DEFAULT_LLM_TEMPERATURE: f64 = 0.7;
const DEFAULT_WEATHER_TTL_SECONDS: u64 = 600;
const DEFAULT_GEOCODE_TTL_MULTIPLIER: u32 = 144;
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_SERVER_BIND: &str = "127.0.0.1:3001";
const DEFAULT_SESSION_IDLE_TIMEOUT_SECONDS: u64 = 1800;
const DEFAULT_GATEWAY_BIND: &str = "127.0.0.1:3000";
const DEFAULT_GATEWAY_MCP_URL: &str = "http://127.0.0.1:3001/mcp";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub weather: WeatherConfig,
    pub llm: LlmConfig,
    pub cache: CacheConfig,
    pub connection: ConnectionConfig,
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WeatherConfig {
    pub geocoding_url: String,
    pub forecast_url: String,
    pub requests_per_second: u32,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    pub weather_ttl_seconds: u64,
    pub geocode_ttl_multiplier: u32,
}

impl CacheConfig {
    pub fn weather_ttl(&self) -> Duration {
        Duration::from_secs(self.weather_ttl_seconds)
    }

    /// Geocoding TTL is always a whole multiple of the weather TTL.
    pub fn geocode_ttl(&self) -> Duration {
        self.weather_ttl() * self.geocode_ttl_multiplier.max(1)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            weather_ttl_seconds: DEFAULT_WEATHER_TTL_SECONDS,
            geocode_ttl_multiplier: DEFAULT_GEOCODE_TTL_MULTIPLIER,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    pub timeout_seconds: u64,
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind: String,
    pub session_idle_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    pub bind: String,
    pub mcp_url: String,
}

impl Config {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut settings = config::Config::builder();

        // Default values
        settings = settings
            .set_default("weather.geocoding_url", DEFAULT_GEOCODING_URL)?
            .set_default("weather.forecast_url", DEFAULT_FORECAST_URL)?
            .set_default("weather.requests_per_second", DEFAULT_REQUESTS_PER_SECOND)?
            .set_default("llm.model", DEFAULT_LLM_MODEL)?
            .set_default("llm.base_url", DEFAULT_LLM_BASE_URL)?
            .set_default("llm.max_tokens", DEFAULT_LLM_MAX_TOKENS)?
            .set_default("llm.temperature", DEFAULT_LLM_TEMPERATURE)?
            .set_default("cache.weather_ttl_seconds", DEFAULT_WEATHER_TTL_SECONDS)?
            .set_default("cache.geocode_ttl_multiplier", DEFAULT_GEOCODE_TTL_MULTIPLIER)?
            .set_default("connection.timeout_seconds", DEFAULT_TIMEOUT_SECONDS)?
            .set_default("server.bind", DEFAULT_SERVER_BIND)?
            .set_default(
                "server.session_idle_timeout_seconds",
                DEFAULT_SESSION_IDLE_TIMEOUT_SECONDS,
            )?
            .set_default("gateway.bind", DEFAULT_GATEWAY_BIND)?
            .set_default("gateway.mcp_url", DEFAULT_GATEWAY_MCP_URL)?;

        // Load from config file if provided
        if let Some(path) = config_path
            && Path::new(path).exists()
        {
            settings = settings.add_source(config::File::with_name(path));
        }

        // Override with environment variables
        settings = settings.add_source(
            config::Environment::with_prefix("WEATHER_MCP")
                .prefix_separator("_")
                .separator("__"),
        );

        // The conventional provider variable is honoured as well
        if let Ok(key) = std::env::var("GEMINI_API_KEY")
            && !key.trim().is_empty()
        {
            settings = settings.set_override("llm.api_key", Some(key))?;
        }

        let config: Config = settings.build()?.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Reject zero durations and rates that would make every call fail.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("cache.weather_ttl_seconds", self.cache.weather_ttl_seconds),
            ("connection.timeout_seconds", self.connection.timeout_seconds),
            (
                "server.session_idle_timeout_seconds",
                self.server.session_idle_timeout_seconds,
            ),
            (
                "weather.requests_per_second",
                u64::from(self.weather.requests_per_second),
            ),
        ];

        for (name, value) in positive {
            if value == 0 {
                return Err(anyhow::anyhow!("{} must be positive", name));
            }
        }
        Ok(())
    }
}
