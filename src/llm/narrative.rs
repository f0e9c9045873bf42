use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::weather::conditions::{compass_direction, describe_opt};
use crate::weather::{DailyReading, TemperatureUnit, WeatherReport};

use super::TextCompletion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativeSource {
    Llm,
    Template,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narrative {
    pub text: String,
    pub source: NarrativeSource,
}

/// Phrases weather data, preferring the completion service when present.
///
/// The template path has no external dependency and cannot fail, so every
/// render produces text.
#[derive(Clone, Default)]
pub struct NarrativeRenderer {
    completion: Option<Arc<dyn TextCompletion>>,
}

impl NarrativeRenderer {
    pub fn new(completion: Option<Arc<dyn TextCompletion>>) -> Self {
        Self { completion }
    }

    pub fn template_only() -> Self {
        Self { completion: None }
    }

    pub fn has_completion(&self) -> bool {
        self.completion.is_some()
    }

    pub async fn render_current(&self, report: &WeatherReport, unit: TemperatureUnit) -> Narrative {
        let facts = render_current_template(report, unit);
        let prompt = format!(
            "You are a friendly weather assistant. Using only the facts below, write a short, \
             conversational summary (two or three sentences) of the current weather in {}. \
             Keep temperatures in {} rounded to whole degrees.\n\nFacts:\n{}",
            report.place_name(),
            unit,
            facts
        );
        self.render(prompt, facts).await
    }

    pub async fn render_forecast(&self, report: &WeatherReport, unit: TemperatureUnit) -> Narrative {
        let facts = render_forecast_template(report, unit);
        let prompt = format!(
            "You are a friendly weather assistant. Using only the facts below, describe the \
             upcoming weather in {} in a few conversational sentences, calling out notable days. \
             Keep temperatures in {} rounded to whole degrees.\n\nFacts:\n{}",
            report.place_name(),
            unit,
            facts
        );
        self.render(prompt, facts).await
    }

    async fn render(&self, prompt: String, fallback: String) -> Narrative {
        if let Some(completion) = &self.completion {
            match completion.complete(&prompt).await {
                Ok(text) if !text.trim().is_empty() => {
                    return Narrative {
                        text: text.trim().to_string(),
                        source: NarrativeSource::Llm,
                    };
                }
                Ok(_) => warn!("completion service returned empty text, using template"),
                Err(e) => warn!(kind = e.kind().as_str(), "completion failed, using template: {}", e),
            }
        } else {
            debug!("no completion service configured, using template");
        }

        Narrative {
            text: fallback,
            source: NarrativeSource::Template,
        }
    }
}

pub fn render_current_template(report: &WeatherReport, unit: TemperatureUnit) -> String {
    let current = &report.forecast.current;
    let mut text = format!(
        "Current weather in {}: {}, {}",
        report.place_name(),
        describe_opt(current.weather_code),
        unit.format(current.temperature)
    );

    if let Some(feels) = current.apparent_temperature
        && feels.round() != current.temperature.round()
    {
        let _ = write!(text, " (feels like {})", unit.format(feels));
    }
    text.push('.');

    if let Some(humidity) = current.humidity {
        let _ = write!(text, " Humidity {}%.", humidity.round() as i64);
    }
    if let Some(speed) = current.wind_speed {
        let _ = write!(text, " Wind {} km/h", speed.round() as i64);
        if let Some(direction) = current.wind_direction {
            let _ = write!(text, " from the {}", compass_direction(direction));
        }
        text.push('.');
    }

    text
}

pub fn render_forecast_template(report: &WeatherReport, unit: TemperatureUnit) -> String {
    let days = &report.forecast.daily;
    if days.is_empty() {
        return render_current_template(report, unit);
    }

    let mut text = format!(
        "{}-day forecast for {}:",
        days.len(),
        report.place_name()
    );
    for day in days {
        let _ = write!(text, "\n- {}", render_day(day, unit));
    }
    text
}

fn render_day(day: &DailyReading, unit: TemperatureUnit) -> String {
    let mut line = format!("{}: {}", day.date, describe_opt(day.weather_code));

    match (day.temperature_max, day.temperature_min) {
        (Some(high), Some(low)) => {
            let _ = write!(line, ", high {} / low {}", unit.format(high), unit.format(low));
        }
        (Some(high), None) => {
            let _ = write!(line, ", high {}", unit.format(high));
        }
        (None, Some(low)) => {
            let _ = write!(line, ", low {}", unit.format(low));
        }
        (None, None) => {}
    }

    if let Some(chance) = day.precipitation_probability {
        let _ = write!(line, ", {}% chance of precipitation", chance.round() as i64);
    }
    if let Some(wind) = day.wind_speed_max {
        let _ = write!(line, ", wind up to {} km/h", wind.round() as i64);
    }
    line
}
