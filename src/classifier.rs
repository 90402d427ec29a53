//! Engagement classifier and emitter
//!
//! Turns the accumulated session into a single [`EngagementRecord`] and
//! publishes it. The session's `emitted` flag makes this at-most-once.

use crate::config::TrackerConfig;
use crate::queue::EventSink;
use crate::session::SessionRecord;
use crate::types::{EngagementRecord, ReaderType, Trigger};

/// Label a page view from its trigger and average speed (px/s)
pub fn classify(trigger: Trigger, speed: u64, speed_standard: f64) -> ReaderType {
    match trigger {
        Trigger::ReachThreshold if speed as f64 > speed_standard => ReaderType::Skimmer,
        Trigger::ReachThreshold => ReaderType::Reader,
        Trigger::Exit => ReaderType::Bouncer,
    }
}

/// Builds and publishes the classification record
#[derive(Debug, Clone, PartialEq)]
pub struct Classifier {
    event_name: String,
    speed_standard: f64,
}

impl Classifier {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            event_name: config.event_name.clone(),
            speed_standard: config.speed_standard,
        }
    }

    /// Record the session would produce for `trigger`, without publishing it
    pub fn record_for(&self, session: &SessionRecord, trigger: Trigger) -> EngagementRecord {
        let speed = session.speed();
        EngagementRecord {
            event: self.event_name.clone(),
            reader_type: classify(trigger, speed, self.speed_standard),
            reader_value: speed,
            max_scroll_depth: session.max_scroll_depth_percent(),
        }
    }

    /// Publish the classification once.
    ///
    /// Returns `None` without touching the session or the sink when a record
    /// was already published.
    pub fn emit<S: EventSink + ?Sized>(
        &self,
        session: &mut SessionRecord,
        trigger: Trigger,
        sink: &S,
    ) -> Option<EngagementRecord> {
        if session.emitted {
            return None;
        }

        let record = self.record_for(session, trigger);
        sink.push(&record);
        session.emitted = true;
        Some(record)
    }
}
