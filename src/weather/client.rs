use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{ConnectionConfig, WeatherConfig};
use crate::error::{McpError, McpResult};

use super::types::{CurrentReading, DailyReading, Forecast, GeoLocation};

pub const MAX_FORECAST_DAYS: u8 = 16;
pub const MAX_GEOCODE_RESULTS: usize = 100;

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,apparent_temperature,weather_code,wind_speed_10m,wind_direction_10m";
const DAILY_FIELDS: &str = "weather_code,temperature_2m_max,temperature_2m_min,precipitation_probability_max,precipitation_sum,wind_speed_10m_max";

/// Source of geocoding results and weather readings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn geocode(&self, city: &str, max_results: usize) -> McpResult<Vec<GeoLocation>>;
    async fn forecast(&self, latitude: f64, longitude: f64, days: u8) -> McpResult<Forecast>;
}

pub struct OpenMeteoClient {
    http: reqwest::Client,
    geocoding_url: String,
    forecast_url: String,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl OpenMeteoClient {
    pub fn new(weather: &WeatherConfig, connection: &ConnectionConfig) -> McpResult<Self> {
        Self::with_urls(
            &weather.geocoding_url,
            &weather.forecast_url,
            weather.requests_per_second,
            connection.timeout(),
        )
    }

    pub fn with_urls(
        geocoding_url: &str,
        forecast_url: &str,
        requests_per_second: u32,
        timeout: Duration,
    ) -> McpResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10).min(timeout))
            .timeout(timeout)
            .build()?;

        let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            http,
            geocoding_url: geocoding_url.to_string(),
            forecast_url: forecast_url.to_string(),
            limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> McpResult<T> {
        self.limiter.until_ready().await;

        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| map_request_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            let reason = response
                .json::<ApiErrorBody>()
                .await
                .ok()
                .and_then(|body| body.reason)
                .unwrap_or_else(|| status.to_string());
            return Err(McpError::Provider(format!(
                "weather service returned HTTP {}: {}",
                status.as_u16(),
                reason
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| McpError::Provider(format!("malformed weather response: {}", e)))
    }
}

/// Connect failures are transport-level; everything else is the provider's fault.
pub(crate) fn map_request_error(url: &str, err: reqwest::Error) -> McpError {
    if err.is_connect() {
        McpError::Transport(format!("could not connect to {}: {}", url, err))
    } else if err.is_timeout() {
        McpError::Provider(format!("request to {} timed out", url))
    } else {
        McpError::Network(err)
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoClient {
    async fn geocode(&self, city: &str, max_results: usize) -> McpResult<Vec<GeoLocation>> {
        let count = max_results.clamp(1, MAX_GEOCODE_RESULTS);
        debug!(city, count, "geocoding request");

        let body: GeocodingResponse = self
            .get_json(
                &self.geocoding_url,
                &[
                    ("name", city.to_string()),
                    ("count", count.to_string()),
                    ("language", "en".to_string()),
                    ("format", "json".to_string()),
                ],
            )
            .await?;

        Ok(body.results.unwrap_or_default())
    }

    async fn forecast(&self, latitude: f64, longitude: f64, days: u8) -> McpResult<Forecast> {
        let days = days.clamp(1, MAX_FORECAST_DAYS);
        debug!(latitude, longitude, days, "forecast request");

        let body: ForecastResponse = self
            .get_json(
                &self.forecast_url,
                &[
                    ("latitude", latitude.to_string()),
                    ("longitude", longitude.to_string()),
                    ("current", CURRENT_FIELDS.to_string()),
                    ("daily", DAILY_FIELDS.to_string()),
                    ("timezone", "auto".to_string()),
                    ("forecast_days", days.to_string()),
                ],
            )
            .await?;

        Ok(body.into_forecast())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    results: Option<Vec<GeoLocation>>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    timezone: String,
    current: RawCurrent,
    #[serde(default)]
    daily: Option<RawDaily>,
}

#[derive(Debug, Deserialize)]
struct RawCurrent {
    #[serde(default)]
    time: String,
    temperature_2m: f64,
    apparent_temperature: Option<f64>,
    relative_humidity_2m: Option<f64>,
    weather_code: Option<u16>,
    wind_speed_10m: Option<f64>,
    wind_direction_10m: Option<f64>,
}

// Open-Meteo returns daily values column-wise
#[derive(Debug, Default, Deserialize)]
struct RawDaily {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    weather_code: Vec<Option<u16>>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_probability_max: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    wind_speed_10m_max: Vec<Option<f64>>,
}

fn column<T: Copy>(values: &[Option<T>], index: usize) -> Option<T> {
    values.get(index).copied().flatten()
}

impl ForecastResponse {
    fn into_forecast(self) -> Forecast {
        let daily = self.daily.unwrap_or_default();
        let days = daily
            .time
            .iter()
            .enumerate()
            .map(|(i, date)| DailyReading {
                date: date.clone(),
                weather_code: column(&daily.weather_code, i),
                temperature_max: column(&daily.temperature_2m_max, i),
                temperature_min: column(&daily.temperature_2m_min, i),
                precipitation_probability: column(&daily.precipitation_probability_max, i),
                precipitation_sum: column(&daily.precipitation_sum, i),
                wind_speed_max: column(&daily.wind_speed_10m_max, i),
            })
            .collect();

        Forecast {
            latitude: self.latitude,
            longitude: self.longitude,
            timezone: self.timezone,
            current: CurrentReading {
                time: self.current.time,
                temperature: self.current.temperature_2m,
                apparent_temperature: self.current.apparent_temperature,
                humidity: self.current.relative_humidity_2m,
                weather_code: self.current.weather_code,
                wind_speed: self.current.wind_speed_10m,
                wind_direction: self.current.wind_direction_10m,
            },
            daily: days,
        }
    }
}
