use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::cache::{CacheKey, ResponseCache};
use crate::error::{McpError, McpResult};

use super::client::WeatherSource;
use super::types::{Forecast, GeoLocation, WeatherReport};

/// City resolution only ever needs the provider's first hit.
const RESOLVE_MAX_RESULTS: usize = 1;

/// Weather lookups that consult the response cache before the data source.
pub struct WeatherService {
    source: Arc<dyn WeatherSource>,
    cache: Arc<ResponseCache>,
}

impl WeatherService {
    pub fn new(source: Arc<dyn WeatherSource>, cache: Arc<ResponseCache>) -> Self {
        Self { source, cache }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub async fn geocode(&self, city: &str, max_results: usize) -> McpResult<Vec<GeoLocation>> {
        let city = city.trim();
        if city.is_empty() {
            return Err(McpError::InvalidArguments(
                "city must not be empty".to_string(),
            ));
        }

        let key = CacheKey::geocode(city, max_results);
        if let Some(hit) = self.cached::<Vec<GeoLocation>>(&key).await {
            return Ok(hit);
        }

        let locations = self.source.geocode(city, max_results).await?;
        // Empty lookups are not cached so a later retry can succeed
        if !locations.is_empty() {
            self.store(key, &locations).await;
        }
        Ok(locations)
    }

    /// Resolves a city name to the provider's first candidate.
    pub async fn resolve_city(&self, city: &str) -> McpResult<GeoLocation> {
        self.geocode(city, RESOLVE_MAX_RESULTS)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                McpError::NotFound(format!(
                    "Could not find a location named '{}'",
                    city.trim()
                ))
            })
    }

    pub async fn forecast(&self, latitude: f64, longitude: f64, days: u8) -> McpResult<Forecast> {
        validate_coordinates(latitude, longitude)?;

        let key = CacheKey::forecast(latitude, longitude, days);
        if let Some(hit) = self.cached::<Forecast>(&key).await {
            return Ok(hit);
        }

        let forecast = self.source.forecast(latitude, longitude, days).await?;
        self.store(key, &forecast).await;
        Ok(forecast)
    }

    /// City → coordinates → forecast, each step cache-first.
    pub async fn report_for_city(&self, city: &str, days: u8) -> McpResult<WeatherReport> {
        let location = self.resolve_city(city).await?;
        debug!(city, resolved = %location.display_name(), "city resolved");
        let forecast = self
            .forecast(location.latitude, location.longitude, days)
            .await?;
        Ok(WeatherReport {
            location: Some(location),
            forecast,
        })
    }

    pub async fn report_for_coordinates(
        &self,
        latitude: f64,
        longitude: f64,
        days: u8,
    ) -> McpResult<WeatherReport> {
        let forecast = self.forecast(latitude, longitude, days).await?;
        Ok(WeatherReport {
            location: None,
            forecast,
        })
    }

    async fn cached<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let value = self.cache.get(key).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(key = %key, "discarding undecodable cache entry: {}", e);
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: CacheKey, value: &T) {
        match serde_json::to_value(value) {
            Ok(json) => self.cache.set(key, json).await,
            Err(e) => warn!(key = %key, "not caching unserializable value: {}", e),
        }
    }
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> McpResult<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(McpError::InvalidArguments(format!(
            "latitude {} is out of range (-90 to 90)",
            latitude
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(McpError::InvalidArguments(format!(
            "longitude {} is out of range (-180 to 180)",
            longitude
        )));
    }
    Ok(())
}
