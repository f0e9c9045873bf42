#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use weather_mcp::cache::ResponseCache;
use weather_mcp::error::{McpError, McpResult};
use weather_mcp::llm::TextCompletion;
use weather_mcp::mcp::RequestHandler;
use weather_mcp::weather::{
    CurrentReading, DailyReading, Forecast, GeoLocation, WeatherSource,
};

pub const WEATHER_TTL: Duration = Duration::from_secs(600);
pub const GEOCODE_TTL: Duration = Duration::from_secs(600 * 144);

/// Weather source that answers from fixed data and counts every call.
#[derive(Default)]
pub struct CountingSource {
    geocodes: AtomicUsize,
    forecasts: AtomicUsize,
}

impl CountingSource {
    pub fn geocode_calls(&self) -> usize {
        self.geocodes.load(Ordering::SeqCst)
    }

    pub fn forecast_calls(&self) -> usize {
        self.forecasts.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.geocode_calls() + self.forecast_calls()
    }
}

pub fn lisbon() -> GeoLocation {
    GeoLocation {
        name: "Lisbon".to_string(),
        country: "Portugal".to_string(),
        admin_region: Some("Lisbon".to_string()),
        latitude: 38.7167,
        longitude: -9.1333,
        timezone: "Europe/Lisbon".to_string(),
        population: Some(517_802),
        elevation: Some(45.0),
    }
}

pub fn sample_forecast(latitude: f64, longitude: f64, days: u8) -> Forecast {
    Forecast {
        latitude,
        longitude,
        timezone: "Europe/Lisbon".to_string(),
        current: CurrentReading {
            time: "2026-10-17T12:00".to_string(),
            temperature: 21.4,
            apparent_temperature: Some(20.8),
            humidity: Some(64.0),
            weather_code: Some(1),
            wind_speed: Some(14.2),
            wind_direction: Some(315.0),
        },
        daily: (0..days)
            .map(|i| DailyReading {
                date: format!("2026-10-{}", 17 + i as u32),
                weather_code: Some(3),
                temperature_max: Some(23.0 + f64::from(i)),
                temperature_min: Some(15.0),
                precipitation_probability: Some(10.0),
                precipitation_sum: Some(0.0),
                wind_speed_max: Some(20.0),
            })
            .collect(),
    }
}

#[async_trait]
impl WeatherSource for CountingSource {
    async fn geocode(&self, city: &str, _max_results: usize) -> McpResult<Vec<GeoLocation>> {
        self.geocodes.fetch_add(1, Ordering::SeqCst);
        if city.eq_ignore_ascii_case("lisbon") {
            Ok(vec![lisbon()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn forecast(&self, latitude: f64, longitude: f64, days: u8) -> McpResult<Forecast> {
        self.forecasts.fetch_add(1, Ordering::SeqCst);
        Ok(sample_forecast(latitude, longitude, days))
    }
}

/// Completion service that is always down.
pub struct FailingCompletion;

#[async_trait]
impl TextCompletion for FailingCompletion {
    async fn complete(&self, _prompt: &str) -> McpResult<String> {
        Err(McpError::Provider("completion service returned HTTP 429".to_string()))
    }
}

pub fn fresh_cache() -> Arc<ResponseCache> {
    Arc::new(ResponseCache::new(WEATHER_TTL, GEOCODE_TTL))
}

pub fn handler_with(
    source: Arc<CountingSource>,
    cache: Arc<ResponseCache>,
    completion: Option<Arc<dyn TextCompletion>>,
) -> RequestHandler {
    RequestHandler::new(cache, source, completion).expect("tool registry builds")
}
