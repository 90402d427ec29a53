//! Scroll sampler
//!
//! Folds one [`ScrollSample`] at a time into a [`SessionRecord`] and reports
//! whether the depth threshold was crossed. Scheduling is the caller's job;
//! see [`crate::tracker::ReaderTracker`] and the `runtime` feature.

use chrono::{DateTime, Utc};

use crate::config::TrackerConfig;
use crate::host::ScrollSample;
use crate::session::SessionRecord;

/// Target polling cadence, in milliseconds
pub const SAMPLE_INTERVAL_MS: u64 = 500;

/// Result of folding one sample into the session
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleOutcome {
    /// Page hidden; nothing was measured
    Paused,
    /// Sample applied
    Sampled {
        /// Depth ratio of this sample, if it was finite and non-negative
        ratio: Option<f64>,
        /// Movement (px) committed by this sample
        movement: f64,
        /// Capped elapsed time (ms) committed by this sample
        elapsed_ms: i64,
        /// The threshold was exceeded while nothing had been emitted yet
        threshold_crossed: bool,
    },
}

/// Stateless sampling rules, parameterised by configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampler {
    threshold_depth: f64,
    timeout_ms: i64,
}

impl Sampler {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            threshold_depth: config.threshold_depth,
            timeout_ms: config.timeout_ms(),
        }
    }

    /// Apply one measurement taken at `now`.
    pub fn sample(
        &self,
        session: &mut SessionRecord,
        sample: ScrollSample,
        now: DateTime<Utc>,
    ) -> SampleOutcome {
        if session.paused {
            return SampleOutcome::Paused;
        }

        let ratio = sample.depth_ratio();
        if let Some(ratio) = ratio {
            if ratio > session.max_depth_ratio {
                session.max_depth_ratio = ratio;
            }
        }

        // A NaN offset would poison the movement total for the rest of the view.
        let delta = if sample.scroll_top.is_finite() {
            (session.last_scroll_top - sample.scroll_top).abs()
        } else {
            0.0
        };
        let elapsed_ms = (now - session.last_sample_at)
            .num_milliseconds()
            .clamp(0, self.timeout_ms);

        let committed = delta != 0.0 || elapsed_ms > 0;
        if committed {
            if sample.scroll_top.is_finite() {
                session.last_scroll_top = sample.scroll_top;
            }
            session.last_sample_at = now;
            session.accumulated_movement += delta;
            session.accumulated_time_ms += elapsed_ms;
        }

        let threshold_crossed =
            !session.emitted && ratio.is_some_and(|r| r > self.threshold_depth);

        SampleOutcome::Sampled {
            ratio,
            movement: if committed { delta } else { 0.0 },
            elapsed_ms: if committed { elapsed_ms } else { 0 },
            threshold_crossed,
        }
    }

    /// Page became hidden: stop measuring, keep every total
    pub fn pause(&self, session: &mut SessionRecord) {
        session.paused = true;
    }

    /// Page became visible again: resume measuring from `now`, so hidden time
    /// is never charged to the next sample.
    pub fn resume(&self, session: &mut SessionRecord, now: DateTime<Utc>) {
        session.paused = false;
        session.last_sample_at = now;
    }
}
