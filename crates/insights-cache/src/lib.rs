use dashmap::DashMap;
use std::time::{Duration, Instant};

use insights_core::{CacheKey, DateRange, InsightPayload, Metric};

/// Default entry lifetime, matching the dashboard's refresh cadence
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Internal cache entry with insertion time and per-entry TTL
struct CacheEntry {
    data: InsightPayload,
    cached_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// In-process TTL cache for insight payloads.
///
/// Entries are evicted lazily on read; there is no background sweep and no
/// persistence across restarts. Safe for concurrent use from in-flight
/// prefetches.
pub struct InsightsCache {
    entries: DashMap<String, CacheEntry>,
    default_ttl: Duration,
}

impl InsightsCache {
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    /// Look up an insight; expired entries are removed and reported absent
    pub fn get(&self, key: &CacheKey) -> Option<InsightPayload> {
        let fingerprint = key.fingerprint();

        let expired = match self.entries.get(&fingerprint) {
            Some(entry) => {
                if !entry.is_expired() {
                    return Some(entry.data.clone());
                }
                true
            }
            None => return None,
        };

        if expired {
            tracing::debug!("Evicting expired insight entry {}", fingerprint);
            self.entries.remove(&fingerprint);
        }
        None
    }

    /// Insert with the default TTL; overwrites any existing entry wholesale
    pub fn set(&self, key: &CacheKey, data: InsightPayload) {
        self.set_with_ttl(key, data, self.default_ttl);
    }

    /// Insert with an explicit TTL; a repeated set restarts the TTL clock
    pub fn set_with_ttl(&self, key: &CacheKey, data: InsightPayload, ttl: Duration) {
        self.entries.insert(
            key.fingerprint(),
            CacheEntry {
                data,
                cached_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Same expiry semantics as `get` without cloning the payload
    pub fn has(&self, key: &CacheKey) -> bool {
        let fingerprint = key.fingerprint();

        let expired = match self.entries.get(&fingerprint) {
            Some(entry) => entry.is_expired(),
            None => return false,
        };

        if expired {
            self.entries.remove(&fingerprint);
            return false;
        }
        true
    }

    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.remove(&key.fingerprint());
    }

    /// Drop every entry for the given metric, across all date windows
    pub fn invalidate_by_metric(&self, metric: Metric) {
        let prefix = format!("insight:{}:", metric);
        self.entries.retain(|fingerprint, _| !fingerprint.starts_with(&prefix));
    }

    /// Drop every entry for the given date window, across all metrics
    pub fn invalidate_by_date_range(&self, range: &DateRange) {
        let needle = format!(":{}:{}:", range.start, range.end);
        self.entries.retain(|fingerprint, _| !fingerprint.contains(&needle));
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InsightsCache {
    fn default() -> Self {
        Self::new()
    }
}
