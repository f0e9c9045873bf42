use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::CacheConfig;

use super::CacheKind;

/// Composite key: the operation name plus its normalized arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: CacheKind,
    operation: String,
    args: String,
}

impl CacheKey {
    pub fn new(kind: CacheKind, operation: &str, args: impl Into<String>) -> Self {
        Self {
            kind,
            operation: operation.to_string(),
            args: args.into(),
        }
    }

    /// Geocoding lookups are keyed on the trimmed, lowercased city name.
    pub fn geocode(city: &str, max_results: usize) -> Self {
        Self::new(
            CacheKind::Geocode,
            "geocode",
            format!("{}:{}", city.trim().to_lowercase(), max_results),
        )
    }

    /// Forecasts are keyed on coordinates rounded to four decimals.
    pub fn forecast(latitude: f64, longitude: f64, days: u8) -> Self {
        Self::new(
            CacheKind::Weather,
            "forecast",
            format!("{:.4},{:.4}:{}", latitude, longitude, days),
        )
    }

    pub fn kind(&self) -> CacheKind {
        self.kind
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.operation, self.args)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Process-scoped key/value cache with per-kind TTLs.
///
/// Entries are never evicted by size; stale entries stay in the map until
/// they are overwritten or `clear` is called.
#[derive(Debug)]
pub struct ResponseCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    weather_ttl: Duration,
    geocode_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(weather_ttl: Duration, geocode_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            weather_ttl,
            geocode_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.weather_ttl(), config.geocode_ttl())
    }

    pub fn ttl(&self, kind: CacheKind) -> Duration {
        match kind {
            CacheKind::Weather => self.weather_ttl,
            CacheKind::Geocode => self.geocode_ttl,
        }
    }

    /// Returns the value if present and younger than its kind's TTL.
    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        let entries = self.entries.read().await;
        let fresh = entries
            .get(key)
            .filter(|entry| !self.is_stale(key.kind(), entry.timestamp, Utc::now()));

        match fresh {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache hit");
                Some(entry.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "cache miss");
                None
            }
        }
    }

    pub async fn set(&self, key: CacheKey, value: Value) {
        self.set_with_timestamp(key, value, Utc::now()).await;
    }

    /// Stores a value with an explicit timestamp, overwriting any prior entry.
    pub async fn set_with_timestamp(&self, key: CacheKey, value: Value, timestamp: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        entries.insert(key, CacheEntry { value, timestamp });
    }

    /// Moves an existing entry's timestamp back by `age`. Returns false if absent.
    pub async fn backdate(&self, key: &CacheKey, age: Duration) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) => {
                let delta = chrono::Duration::from_std(age).unwrap_or(chrono::Duration::MAX);
                entry.timestamp = entry
                    .timestamp
                    .checked_sub_signed(delta)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                true
            }
            None => false,
        }
    }

    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len().await,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn is_stale(&self, kind: CacheKind, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        // Timestamps in the future count as age zero
        let age = (now - timestamp).to_std().unwrap_or(Duration::ZERO);
        age >= self.ttl(kind)
    }
}
