pub mod client;
pub mod conditions;
pub mod service;
pub mod types;

pub use client::{OpenMeteoClient, WeatherSource};
pub use service::WeatherService;
pub use types::{
    CurrentReading, DailyReading, Forecast, GeoLocation, TemperatureUnit, WeatherReport,
};
