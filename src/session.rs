//! Per-page-view session record
//!
//! Owned by exactly one tracker for the lifetime of one page view. Fields are
//! read-only outside the crate; the sampler and classifier are the only
//! writers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Accumulated scroll state for one page view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub(crate) accumulated_movement: f64,
    pub(crate) accumulated_time_ms: i64,
    pub(crate) last_scroll_top: f64,
    pub(crate) last_sample_at: DateTime<Utc>,
    pub(crate) max_depth_ratio: f64,
    pub(crate) emitted: bool,
    pub(crate) paused: bool,
}

impl SessionRecord {
    /// Fresh record. Accumulated time starts at 1 ms so speed is always defined.
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            accumulated_movement: 0.0,
            accumulated_time_ms: 1,
            last_scroll_top: 0.0,
            last_sample_at: started_at,
            max_depth_ratio: 0.0,
            emitted: false,
            paused: false,
        }
    }

    /// Sum of absolute scroll deltas, in pixels
    pub fn accumulated_movement(&self) -> f64 {
        self.accumulated_movement
    }

    /// Sum of capped per-sample elapsed time, in milliseconds (never zero)
    pub fn accumulated_time_ms(&self) -> i64 {
        self.accumulated_time_ms
    }

    pub fn last_scroll_top(&self) -> f64 {
        self.last_scroll_top
    }

    pub fn last_sample_at(&self) -> DateTime<Utc> {
        self.last_sample_at
    }

    /// Highest depth ratio observed so far
    pub fn max_depth_ratio(&self) -> f64 {
        self.max_depth_ratio
    }

    pub fn is_emitted(&self) -> bool {
        self.emitted
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Average scroll speed in whole pixels per second
    pub fn speed(&self) -> u64 {
        let time_ms = self.accumulated_time_ms.max(1) as f64;
        (self.accumulated_movement / time_ms * 1000.0).floor() as u64
    }

    /// Maximum depth as a rounded percentage of document height
    pub fn max_scroll_depth_percent(&self) -> u32 {
        (self.max_depth_ratio * 100.0).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record() {
        let record = SessionRecord::new(Utc::now());
        assert_eq!(record.accumulated_time_ms(), 1);
        assert_eq!(record.accumulated_movement(), 0.0);
        assert_eq!(record.speed(), 0);
        assert!(!record.is_emitted());
        assert!(!record.is_paused());
    }

    #[test]
    fn test_speed_truncates() {
        let mut record = SessionRecord::new(Utc::now());
        record.accumulated_movement = 6000.0;
        record.accumulated_time_ms = 10_000;
        assert_eq!(record.speed(), 600);

        record.accumulated_movement = 999.0;
        record.accumulated_time_ms = 7_000;
        // 142.71 px/s
        assert_eq!(record.speed(), 142);
    }

    #[test]
    fn test_depth_percent_rounds() {
        let mut record = SessionRecord::new(Utc::now());
        record.max_depth_ratio = 0.846;
        assert_eq!(record.max_scroll_depth_percent(), 85);

        record.max_depth_ratio = 1.0416;
        assert_eq!(record.max_scroll_depth_percent(), 104);
    }
}
