use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Write as _;
use std::sync::Arc;

use super::schema::{InputSchema, ParamType, ToolArgs};
use super::{Tool, ToolResult};
use crate::error::{IntoMcpError, McpResult};
use crate::llm::{NarrativeRenderer, NarrativeSource};
use crate::utils::validate_range;
use crate::weather::client::{MAX_FORECAST_DAYS, MAX_GEOCODE_RESULTS};
use crate::weather::{GeoLocation, TemperatureUnit, WeatherReport, WeatherService};

const UNIT_OPTIONS: &[&str] = &["celsius", "fahrenheit", "c", "f", "metric", "imperial"];
const DEFAULT_FORECAST_DAYS: u8 = 3;
const DEFAULT_GEOCODE_LIMIT: usize = 5;

fn units_schema(schema: InputSchema) -> InputSchema {
    schema.optional_enum(
        "units",
        "Temperature units: celsius or fahrenheit (default: celsius)",
        "celsius",
        UNIT_OPTIONS,
    )
}

/// Structured payload attached to weather results.
#[derive(Debug, Serialize)]
struct WeatherPayload<'a> {
    #[serde(flatten)]
    report: &'a WeatherReport,
    units: TemperatureUnit,
    #[serde(rename = "narrativeSource")]
    narrative_source: NarrativeSource,
}

fn weather_result(
    report: &WeatherReport,
    unit: TemperatureUnit,
    text: String,
    source: NarrativeSource,
) -> McpResult<ToolResult> {
    let payload = serde_json::to_value(WeatherPayload {
        report,
        units: unit,
        narrative_source: source,
    })
    .mcp_context("Failed to encode weather payload")?;
    Ok(ToolResult::text(text).with_structured(payload))
}

pub struct GetWeatherTool {
    service: Arc<WeatherService>,
    renderer: NarrativeRenderer,
}

pub struct GetForecastTool {
    service: Arc<WeatherService>,
    renderer: NarrativeRenderer,
}

pub struct GetWeatherByCoordinatesTool {
    service: Arc<WeatherService>,
    renderer: NarrativeRenderer,
}

pub struct GeocodeCityTool {
    service: Arc<WeatherService>,
}

impl GetWeatherTool {
    pub fn new(service: Arc<WeatherService>, renderer: NarrativeRenderer) -> Self {
        Self { service, renderer }
    }
}

impl GetForecastTool {
    pub fn new(service: Arc<WeatherService>, renderer: NarrativeRenderer) -> Self {
        Self { service, renderer }
    }
}

impl GetWeatherByCoordinatesTool {
    pub fn new(service: Arc<WeatherService>, renderer: NarrativeRenderer) -> Self {
        Self { service, renderer }
    }
}

impl GeocodeCityTool {
    pub fn new(service: Arc<WeatherService>) -> Self {
        Self { service }
    }
}

#[derive(Debug, Deserialize)]
struct CityParams {
    city: String,
    units: String,
}

#[derive(Debug, Deserialize)]
struct ForecastParams {
    city: String,
    days: u32,
    units: String,
}

#[derive(Debug, Deserialize)]
struct CoordinateParams {
    latitude: f64,
    longitude: f64,
    units: String,
}

#[derive(Debug, Deserialize)]
struct GeocodeParams {
    city: String,
    limit: u32,
}

#[async_trait]
impl Tool for GetWeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get current weather conditions for a city"
    }

    fn input_schema(&self) -> InputSchema {
        units_schema(InputSchema::new().required(
            "city",
            ParamType::String,
            "City name, optionally with region or country (e.g. 'Paris' or 'Portland, Oregon')",
        ))
    }

    async fn execute(&self, args: ToolArgs) -> McpResult<ToolResult> {
        let params: CityParams = args.parse()?;
        let unit: TemperatureUnit = params.units.parse()?;

        let report = self.service.report_for_city(&params.city, 1).await?;
        let narrative = self.renderer.render_current(&report, unit).await;
        weather_result(&report, unit, narrative.text, narrative.source)
    }
}

#[async_trait]
impl Tool for GetForecastTool {
    fn name(&self) -> &str {
        "get_forecast"
    }

    fn description(&self) -> &str {
        "Get a multi-day weather forecast for a city"
    }

    fn input_schema(&self) -> InputSchema {
        units_schema(
            InputSchema::new()
                .required("city", ParamType::String, "City name")
                .optional(
                    "days",
                    ParamType::Number,
                    "Number of forecast days, 1-16 (default: 3)",
                    Some(json!(DEFAULT_FORECAST_DAYS)),
                ),
        )
    }

    async fn execute(&self, args: ToolArgs) -> McpResult<ToolResult> {
        let params: ForecastParams = args.parse()?;
        let unit: TemperatureUnit = params.units.parse()?;
        validate_range("days", params.days, 1, MAX_FORECAST_DAYS as u32)?;

        let report = self
            .service
            .report_for_city(&params.city, params.days as u8)
            .await?;
        let narrative = self.renderer.render_forecast(&report, unit).await;
        weather_result(&report, unit, narrative.text, narrative.source)
    }
}

#[async_trait]
impl Tool for GetWeatherByCoordinatesTool {
    fn name(&self) -> &str {
        "get_weather_by_coordinates"
    }

    fn description(&self) -> &str {
        "Get current weather conditions for a latitude/longitude pair"
    }

    fn input_schema(&self) -> InputSchema {
        units_schema(
            InputSchema::new()
                .required("latitude", ParamType::Number, "Latitude in degrees (-90 to 90)")
                .required("longitude", ParamType::Number, "Longitude in degrees (-180 to 180)"),
        )
    }

    async fn execute(&self, args: ToolArgs) -> McpResult<ToolResult> {
        let params: CoordinateParams = args.parse()?;
        let unit: TemperatureUnit = params.units.parse()?;

        let report = self
            .service
            .report_for_coordinates(params.latitude, params.longitude, 1)
            .await?;
        let narrative = self.renderer.render_current(&report, unit).await;
        weather_result(&report, unit, narrative.text, narrative.source)
    }
}

#[async_trait]
impl Tool for GeocodeCityTool {
    fn name(&self) -> &str {
        "geocode_city"
    }

    fn description(&self) -> &str {
        "Look up candidate locations (coordinates, country, timezone) for a city name"
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new()
            .required("city", ParamType::String, "City name to look up")
            .optional(
                "limit",
                ParamType::Number,
                "Maximum number of candidates (default: 5)",
                Some(json!(DEFAULT_GEOCODE_LIMIT)),
            )
    }

    async fn execute(&self, args: ToolArgs) -> McpResult<ToolResult> {
        let params: GeocodeParams = args.parse()?;
        validate_range("limit", params.limit, 1, MAX_GEOCODE_RESULTS as u32)?;

        let locations = self
            .service
            .geocode(&params.city, params.limit as usize)
            .await?;

        let text = render_locations(params.city.trim(), &locations);
        Ok(ToolResult::text(text).with_structured(json!({ "locations": locations })))
    }
}

fn render_locations(city: &str, locations: &[GeoLocation]) -> String {
    if locations.is_empty() {
        return format!("No locations found for '{}'.", city);
    }

    let mut text = format!("Locations matching '{}':", city);
    for (i, location) in locations.iter().enumerate() {
        let _ = write!(
            text,
            "\n{}. {} ({:.4}, {:.4})",
            i + 1,
            location.display_name(),
            location.latitude,
            location.longitude
        );
        if !location.timezone.is_empty() {
            let _ = write!(text, ", {}", location.timezone);
        }
    }
    text
}
