// ⏳ Freshness Cache - is persisted data recent enough to skip a fetch?
// Freshness is tracked per data category, never record-wide: refreshed
// licenses say nothing about the status block, and vice versa.
//
// "Fresh" means: the category's timestamp falls on today's calendar date
// in UTC AND the category actually holds data. The original compared
// wall-clock days with no declared zone; UTC is the explicit choice here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The two independently-tracked data categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataCategory {
    Status,
    Licenses,
}

pub struct FreshnessCache;

impl FreshnessCache {
    pub fn new() -> Self {
        FreshnessCache
    }

    /// Decide whether one category of a persisted record is fresh.
    ///
    /// * `last_updated` - the category's own timestamp (None = never
    ///   fetched)
    /// * `has_data` - whether the category holds anything; an empty
    ///   category is never fresh, even if stamped today
    /// * `force_refresh` - caller explicitly asked for a re-fetch; always
    ///   reports stale
    pub fn is_fresh(
        &self,
        last_updated: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        has_data: bool,
        force_refresh: bool,
    ) -> bool {
        if force_refresh || !has_data {
            return false;
        }

        match last_updated {
            Some(ts) => ts.date_naive() == now.date_naive(),
            None => false,
        }
    }
}

impl Default for FreshnessCache {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_same_day_with_data_is_fresh() {
        let cache = FreshnessCache::new();
        let updated = at(2026, 8, 6, 7);
        let now = at(2026, 8, 6, 22);

        assert!(cache.is_fresh(Some(updated), now, true, false));
    }

    #[test]
    fn test_previous_day_is_stale() {
        let cache = FreshnessCache::new();
        // 23:59 yesterday vs 00:01 today: different calendar dates,
        // even though only minutes apart
        let updated = at(2026, 8, 5, 23);
        let now = at(2026, 8, 6, 0);

        assert!(!cache.is_fresh(Some(updated), now, true, false));
    }

    #[test]
    fn test_empty_category_is_never_fresh() {
        let cache = FreshnessCache::new();
        let now = at(2026, 8, 6, 12);

        assert!(!cache.is_fresh(Some(now), now, false, false));
    }

    #[test]
    fn test_missing_timestamp_is_stale() {
        let cache = FreshnessCache::new();
        let now = at(2026, 8, 6, 12);

        assert!(!cache.is_fresh(None, now, true, false));
    }

    #[test]
    fn test_force_refresh_always_stale() {
        let cache = FreshnessCache::new();
        let now = at(2026, 8, 6, 12);

        assert!(!cache.is_fresh(Some(now), now, true, true));
    }
}
