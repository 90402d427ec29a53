//! Host environment inputs
//!
//! The tracker never talks to a page directly. Hosts hand it scroll
//! measurements, timestamps and lifecycle signals through the types here.

use std::cell::Cell;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// One measurement of the page's vertical scroll geometry, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScrollSample {
    /// Current vertical scroll offset
    pub scroll_top: f64,
    /// Height of the visible viewport
    pub viewport_height: f64,
    /// Full scrollable height of the document body
    pub document_height: f64,
}

impl ScrollSample {
    pub fn new(scroll_top: f64, viewport_height: f64, document_height: f64) -> Self {
        Self {
            scroll_top,
            viewport_height,
            document_height,
        }
    }

    /// Fraction of the document brought into view, `(scroll + viewport) / document`.
    ///
    /// Returns `None` when the ratio is not a finite, non-negative number
    /// (zero-height documents, NaN offsets).
    pub fn depth_ratio(&self) -> Option<f64> {
        let ratio = (self.scroll_top + self.viewport_height) / self.document_height;
        (ratio.is_finite() && ratio >= 0.0).then_some(ratio)
    }
}

/// Page visibility state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Document loading state at the time the tracker is started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
}

/// Source of scroll measurements
pub trait PageHost {
    fn measure(&mut self) -> Result<ScrollSample, TrackerError>;
}

impl<F> PageHost for F
where
    F: FnMut() -> Result<ScrollSample, TrackerError>,
{
    fn measure(&mut self) -> Result<ScrollSample, TrackerError> {
        self()
    }
}

/// Wall-clock source
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Real system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and offline replay
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        self.now.set(self.now.get() + Duration::milliseconds(ms));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}
