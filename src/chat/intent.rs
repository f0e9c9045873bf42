//! Keyword-based classification of chat messages.
//!
//! Everything here is a pure function of the message text so it can be tested
//! without a network.

use crate::utils::title_case;
use crate::weather::TemperatureUnit;

const WEATHER_KEYWORDS: &[&str] = &[
    "weather",
    "temperature",
    "forecast",
    "rain",
    "snow",
    "sunny",
    "cloudy",
    "windy",
    "wind speed",
    "humid",
    "storm",
    "degrees",
    "umbrella",
    "how hot",
    "how cold",
];

const FORECAST_KEYWORDS: &[&str] = &[
    "forecast",
    "tomorrow",
    "this week",
    "next week",
    "weekend",
    "next few days",
    "coming days",
    "upcoming",
];

const FAHRENHEIT_KEYWORDS: &[&str] = &["fahrenheit", "°f", "imperial"];
const CELSIUS_KEYWORDS: &[&str] = &["celsius", "°c", "centigrade", "metric"];

const CITY_PREFIXES: &[&str] = &["in", "for", "at", "near"];

// Words that end a city phrase
const CITY_STOP_WORDS: &[&str] = &[
    "today", "tomorrow", "tonight", "now", "right", "this", "next", "the", "weekend", "week",
    "please", "in", "for", "on", "at", "and", "with", "like", "celsius", "fahrenheit",
    "degrees", "over", "during", "days", "day",
];

const QUESTION_WORDS: &[&str] = &[
    "what", "what's", "whats", "how", "how's", "is", "will", "does", "do", "the", "any", "show",
    "tell", "give", "get",
];

const MAX_CITY_WORDS: usize = 4;
pub const DEFAULT_FORECAST_DAYS: u8 = 3;

/// What a chat message is asking for.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub is_weather: bool,
    pub wants_forecast: bool,
    pub units: Option<TemperatureUnit>,
    pub days: Option<u8>,
    pub city_hint: Option<String>,
}

pub fn classify(message: &str) -> Intent {
    let lower = message.to_lowercase();
    let is_weather = contains_any(&lower, WEATHER_KEYWORDS);
    let wants_forecast = contains_any(&lower, FORECAST_KEYWORDS) || detect_days(message).is_some();

    Intent {
        is_weather,
        wants_forecast,
        units: detect_units(message),
        days: detect_days(message),
        city_hint: extract_city_heuristic(message),
    }
}

/// Explicit unit preference, if the message names one.
pub fn detect_units(message: &str) -> Option<TemperatureUnit> {
    let lower = message.to_lowercase();
    if contains_any(&lower, FAHRENHEIT_KEYWORDS) {
        Some(TemperatureUnit::Fahrenheit)
    } else if contains_any(&lower, CELSIUS_KEYWORDS) {
        Some(TemperatureUnit::Celsius)
    } else {
        None
    }
}

/// Forecast length from phrases like "5 days", "7-day" or "next week".
pub fn detect_days(message: &str) -> Option<u8> {
    let lower = message.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|t| !t.is_empty())
        .collect();

    for pair in tokens.windows(2) {
        if let Ok(n) = pair[0].parse::<u8>()
            && pair[1].starts_with("day")
            && n > 0
        {
            return Some(n.min(16));
        }
    }

    if lower.contains("week") {
        Some(7)
    } else if lower.contains("tomorrow") {
        Some(2)
    } else {
        None
    }
}

/// Best-effort city from "weather in <City>" or "<City> weather" phrasing.
pub fn extract_city_heuristic(message: &str) -> Option<String> {
    let words: Vec<&str> = message.split_whitespace().collect();

    for (i, word) in words.iter().enumerate() {
        if !CITY_PREFIXES.contains(&normalize(word).as_str()) {
            continue;
        }
        if let Some(city) = collect_city(&words[i + 1..]) {
            return Some(city);
        }
    }

    city_before_keyword(&words)
}

fn collect_city(words: &[&str]) -> Option<String> {
    let mut parts = Vec::new();

    for raw in words.iter().take(MAX_CITY_WORDS) {
        let word = strip_punctuation(raw);
        if word.is_empty() || CITY_STOP_WORDS.contains(&word.to_lowercase().as_str()) {
            break;
        }
        if word.chars().any(|c| c.is_ascii_digit()) {
            break;
        }
        parts.push(word);
        if ends_clause(raw) {
            break;
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(title_case(&parts.join(" ")))
    }
}

fn city_before_keyword(words: &[&str]) -> Option<String> {
    let keyword_at = words
        .iter()
        .position(|w| matches!(normalize(w).as_str(), "weather" | "forecast" | "temperature"))?;

    let mut parts: Vec<String> = words[..keyword_at]
        .iter()
        .rev()
        .take_while(|w| {
            let word = strip_punctuation(w);
            word.chars().next().is_some_and(char::is_uppercase)
                && !QUESTION_WORDS.contains(&word.to_lowercase().as_str())
        })
        .take(MAX_CITY_WORDS)
        .map(|w| strip_punctuation(w))
        .collect();

    if parts.is_empty() {
        return None;
    }
    parts.reverse();
    Some(parts.join(" "))
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn strip_punctuation(word: &str) -> String {
    word.trim_matches(|c: char| !c.is_alphanumeric())
        .trim_end_matches("'s")
        .to_string()
}

fn normalize(word: &str) -> String {
    strip_punctuation(word).to_lowercase()
}

fn ends_clause(word: &str) -> bool {
    word.ends_with([',', '.', '?', '!', ';', ':'])
}
