pub mod response_cache;

pub use response_cache::{CacheEntry, CacheKey, CacheStats, ResponseCache};

// TTL categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// Current and forecast readings (short TTL)
    Weather,
    /// City lookups (long TTL)
    Geocode,
}
