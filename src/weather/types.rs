use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::McpError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default, alias = "admin1", skip_serializing_if = "Option::is_none")]
    pub admin_region: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub timezone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
}

impl GeoLocation {
    /// "Name, Region, Country" with empty and repeated parts dropped.
    pub fn display_name(&self) -> String {
        let mut parts: Vec<&str> = vec![self.name.as_str()];
        if let Some(region) = self.admin_region.as_deref()
            && !region.is_empty()
            && region != self.name
        {
            parts.push(region);
        }
        if !self.country.is_empty() {
            parts.push(&self.country);
        }
        parts.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentReading {
    pub time: String,
    pub temperature: f64,
    pub apparent_temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub weather_code: Option<u16>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReading {
    pub date: String,
    pub weather_code: Option<u16>,
    pub temperature_max: Option<f64>,
    pub temperature_min: Option<f64>,
    pub precipitation_probability: Option<f64>,
    pub precipitation_sum: Option<f64>,
    pub wind_speed_max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    pub current: CurrentReading,
    pub daily: Vec<DailyReading>,
}

/// A resolved place together with its weather, as handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: Option<GeoLocation>,
    pub forecast: Forecast,
}

impl WeatherReport {
    pub fn place_name(&self) -> String {
        match &self.location {
            Some(location) => location.display_name(),
            None => format!(
                "{:.2}, {:.2}",
                self.forecast.latitude, self.forecast.longitude
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }

    /// Converts a Celsius reading into this unit.
    pub fn from_celsius(&self, celsius: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    /// Whole-degree display of a Celsius reading, e.g. `72°F`.
    pub fn format(&self, celsius: f64) -> String {
        format!("{}{}", self.from_celsius(celsius).round() as i64, self.symbol())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "celsius",
            TemperatureUnit::Fahrenheit => "fahrenheit",
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemperatureUnit {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "celsius" | "c" | "metric" => Ok(TemperatureUnit::Celsius),
            "fahrenheit" | "f" | "imperial" => Ok(TemperatureUnit::Fahrenheit),
            other => Err(McpError::InvalidArguments(format!(
                "unsupported units '{}': expected celsius or fahrenheit",
                other
            ))),
        }
    }
}
