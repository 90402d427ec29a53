//! Page-view tracker
//!
//! [`ReaderTracker`] owns one [`SessionRecord`] and wires the sampler and the
//! classifier to the page lifecycle:
//!
//! ```text
//! NotStarted ──start(Loading)──▶ AwaitingDocument ──document ready──▶ Running
//!      └────────────start(Interactive | Complete)────────────────────▶ Running
//! any live state ──page hide──▶ TornDown
//! any state ──dispose──▶ Disposed        Running ──host fault──▶ Faulted
//! ```
//!
//! None of the lifecycle methods return errors: failures are logged and the
//! tracker degrades to publishing nothing further.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::Classifier;
use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::host::{Clock, PageHost, ReadyState, ScrollSample, SystemClock, Visibility};
use crate::queue::{DataLayer, EventSink};
use crate::sampler::{SampleOutcome, Sampler};
use crate::session::SessionRecord;
use crate::types::{EngagementRecord, Trigger};
use crate::{tracker_debug, tracker_error};

/// Lifecycle state of a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    /// Built, sampling not requested yet
    NotStarted,
    /// Start requested while the document was still loading
    AwaitingDocument,
    /// Sampling
    Running,
    /// Page hidden for good or unloaded
    TornDown,
    /// Disposed by the host; inert
    Disposed,
    /// A host fault stopped the tracker; inert
    Faulted,
}

impl TrackerState {
    /// States in which page signals are still observed
    fn is_live(self) -> bool {
        matches!(
            self,
            TrackerState::NotStarted | TrackerState::AwaitingDocument | TrackerState::Running
        )
    }
}

/// Engagement tracker for a single page view
pub struct ReaderTracker<S: EventSink = DataLayer> {
    page_view_id: Uuid,
    config: TrackerConfig,
    sampler: Sampler,
    classifier: Classifier,
    session: SessionRecord,
    state: TrackerState,
    ticks: u64,
    sink: S,
}

impl<S: EventSink> ReaderTracker<S> {
    /// Create a tracker whose session starts now
    pub fn new(config: TrackerConfig, sink: S) -> Self {
        Self::with_start_time(config, sink, SystemClock.now())
    }

    /// Create a tracker whose session time basis is `started_at`
    pub fn with_start_time(config: TrackerConfig, sink: S, started_at: DateTime<Utc>) -> Self {
        let report = config.sanitized();
        let config = report.config;
        let page_view_id = Uuid::new_v4();

        for fallback in &report.fallbacks {
            tracker_debug!(
                config.debug,
                "[{}] option {} reset to default: {}",
                page_view_id,
                fallback.option,
                fallback.reason
            );
        }
        tracker_debug!(config.debug, "[{}] tracker initialized", page_view_id);

        Self {
            page_view_id,
            sampler: Sampler::new(&config),
            classifier: Classifier::new(&config),
            session: SessionRecord::new(started_at),
            state: TrackerState::NotStarted,
            ticks: 0,
            config,
            sink,
        }
    }

    pub fn page_view_id(&self) -> Uuid {
        self.page_view_id
    }

    /// Effective (sanitized) configuration
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionRecord {
        &self.session
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Number of ticks that reached the sampler (paused ticks included)
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_emitted(&self) -> bool {
        self.session.emitted
    }

    /// Whether ticks are currently folded into the session
    pub fn is_sampling(&self) -> bool {
        self.state == TrackerState::Running
    }

    /// Request sampling. While the document is loading, sampling is deferred
    /// until [`ReaderTracker::on_document_ready`]. Calling this twice is a no-op.
    pub fn start(&mut self, ready: ReadyState) {
        if self.state != TrackerState::NotStarted {
            return;
        }
        self.state = match ready {
            ReadyState::Loading => TrackerState::AwaitingDocument,
            ReadyState::Interactive | ReadyState::Complete => TrackerState::Running,
        };
        tracker_debug!(self.config.debug, "[{}] start: {:?}", self.page_view_id, self.state);
    }

    /// The document finished its initial load
    pub fn on_document_ready(&mut self) {
        if self.state == TrackerState::AwaitingDocument {
            self.state = TrackerState::Running;
            tracker_debug!(self.config.debug, "[{}] document ready, sampling", self.page_view_id);
        }
    }

    /// Fold one measurement into the session; publishes when the depth
    /// threshold is crossed for the first time.
    pub fn tick(&mut self, sample: ScrollSample, now: DateTime<Utc>) -> Option<EngagementRecord> {
        if self.state != TrackerState::Running {
            return None;
        }
        self.ticks += 1;

        match self.sampler.sample(&mut self.session, sample, now) {
            SampleOutcome::Paused => None,
            SampleOutcome::Sampled {
                threshold_crossed: true,
                ..
            } => self.emit(Trigger::ReachThreshold),
            SampleOutcome::Sampled { .. } => None,
        }
    }

    /// Measure through `host` and tick. A failed or panicking measurement
    /// faults the tracker.
    pub fn poll<H, C>(&mut self, host: &mut H, clock: &C) -> Option<EngagementRecord>
    where
        H: PageHost + ?Sized,
        C: Clock + ?Sized,
    {
        if self.state != TrackerState::Running {
            return None;
        }
        if self.session.paused {
            self.ticks += 1;
            return None;
        }
        let measured = panic::catch_unwind(AssertUnwindSafe(|| host.measure()))
            .unwrap_or_else(|payload| Err(TrackerError::Measurement(panic_message(payload.as_ref()))));
        match measured {
            Ok(sample) => self.tick(sample, clock.now()),
            Err(e) => {
                self.fault(e);
                None
            }
        }
    }

    /// Page visibility changed
    pub fn on_visibility_change(&mut self, visibility: Visibility, now: DateTime<Utc>) {
        if !self.state.is_live() {
            return;
        }
        match visibility {
            Visibility::Hidden => {
                self.sampler.pause(&mut self.session);
                tracker_debug!(self.config.debug, "[{}] tracking paused (page hidden)", self.page_view_id);
            }
            Visibility::Visible => {
                self.sampler.resume(&mut self.session, now);
                tracker_debug!(self.config.debug, "[{}] tracking resumed", self.page_view_id);
            }
        }
    }

    /// The page is being torn down: publish the fallback classification if
    /// nothing was published yet. Further ticks are ignored afterwards.
    pub fn on_page_hide(&mut self) -> Option<EngagementRecord> {
        if !self.state.is_live() {
            return None;
        }
        let record = self.emit(Trigger::Exit);
        self.state = TrackerState::TornDown;
        record
    }

    /// Detach from the page. Nothing is published after this, including on teardown.
    pub fn dispose(&mut self) {
        if self.state != TrackerState::Disposed {
            tracker_debug!(self.config.debug, "[{}] disposed", self.page_view_id);
            self.state = TrackerState::Disposed;
        }
    }

    /// Contain a runtime fault: log it and stop publishing.
    pub fn fault(&mut self, error: TrackerError) {
        if matches!(self.state, TrackerState::Disposed | TrackerState::Faulted) {
            return;
        }
        tracker_error!("[{}] tracker stopped: {}", self.page_view_id, error);
        self.state = TrackerState::Faulted;
    }

    fn emit(&mut self, trigger: Trigger) -> Option<EngagementRecord> {
        let record = self.classifier.emit(&mut self.session, trigger, &self.sink)?;
        tracker_debug!(
            self.config.debug,
            "[{}] sent: {}",
            self.page_view_id,
            serde_json::to_string(&record).unwrap_or_default()
        );
        Some(record)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("host panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("host panicked: {}", message)
    } else {
        "host panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ManualClock;
    use crate::types::ReaderType;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
    }

    fn at(ms: i64) -> DateTime<Utc> {
        start() + Duration::milliseconds(ms)
    }

    fn running_tracker() -> (ReaderTracker, DataLayer) {
        let layer = DataLayer::new();
        let mut tracker =
            ReaderTracker::with_start_time(TrackerConfig::default(), layer.clone(), start());
        tracker.start(ReadyState::Complete);
        (tracker, layer)
    }

    fn page(scroll_top: f64) -> ScrollSample {
        ScrollSample::new(scroll_top, 1000.0, 10_000.0)
    }

    #[test]
    fn test_slow_reader() {
        let (mut tracker, layer) = running_tracker();

        // 100 px every 500 ms -> ~200 px/s
        let mut record = None;
        for i in 1..=90 {
            record = record.or(tracker.tick(page(100.0 * i as f64), at(500 * i)));
        }

        let record = record.expect("threshold crossed");
        assert_eq!(record.reader_type, ReaderType::Reader);
        assert_eq!(record.reader_value, 199);
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn test_fast_skimmer() {
        let (mut tracker, layer) = running_tracker();

        tracker.tick(page(3000.0), at(500));
        let record = tracker.tick(page(8000.0), at(1000)).unwrap();

        assert_eq!(record.reader_type, ReaderType::Skimmer);
        assert_eq!(record.max_scroll_depth, 90);
        assert_eq!(layer.records(), vec![record]);
    }

    #[test]
    fn test_teardown_before_threshold_is_bouncer() {
        let (mut tracker, layer) = running_tracker();
        tracker.tick(page(4000.0), at(500));

        let record = tracker.on_page_hide().unwrap();

        assert_eq!(record.reader_type, ReaderType::Bouncer);
        assert_eq!(record.max_scroll_depth, 50);
        assert_eq!(tracker.state(), TrackerState::TornDown);
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn test_teardown_after_threshold_publishes_nothing() {
        let (mut tracker, layer) = running_tracker();
        tracker.tick(page(9000.0), at(500)).unwrap();

        assert!(tracker.on_page_hide().is_none());
        assert!(tracker.on_page_hide().is_none());
        assert!(tracker.tick(page(9000.0), at(1000)).is_none());
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn test_ticks_after_teardown_ignored() {
        let (mut tracker, layer) = running_tracker();
        tracker.on_page_hide();
        let frozen = tracker.session().clone();

        assert!(tracker.tick(page(9500.0), at(500)).is_none());
        assert_eq!(tracker.session(), &frozen);
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn test_loading_document_defers_sampling() {
        let layer = DataLayer::new();
        let mut tracker = ReaderTracker::with_start_time(TrackerConfig::default(), layer, start());
        tracker.start(ReadyState::Loading);

        assert_eq!(tracker.state(), TrackerState::AwaitingDocument);
        assert!(tracker.tick(page(9000.0), at(500)).is_none());
        assert_eq!(tracker.ticks(), 0);

        tracker.on_document_ready();
        assert!(tracker.is_sampling());
        assert!(tracker.tick(page(9000.0), at(1000)).is_some());
    }

    #[test]
    fn test_start_is_idempotent() {
        let (mut tracker, _layer) = running_tracker();
        tracker.start(ReadyState::Loading);
        assert_eq!(tracker.state(), TrackerState::Running);
    }

    #[test]
    fn test_teardown_before_start_still_classifies() {
        let layer = DataLayer::new();
        let mut tracker = ReaderTracker::with_start_time(TrackerConfig::default(), layer.clone(), start());

        let record = tracker.on_page_hide().unwrap();
        assert_eq!(record.reader_type, ReaderType::Bouncer);
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn test_hidden_time_not_charged() {
        let (mut tracker, _layer) = running_tracker();
        tracker.tick(page(1000.0), at(500));

        tracker.on_visibility_change(Visibility::Hidden, at(600));
        for i in 2..100 {
            assert!(tracker.tick(page(9900.0), at(500 * i)).is_none());
        }
        assert_eq!(tracker.session().max_depth_ratio(), 0.2);

        tracker.on_visibility_change(Visibility::Visible, at(600_000));
        tracker.tick(page(1000.0), at(600_500));

        assert_eq!(tracker.session().accumulated_time_ms(), 1001);
        assert_eq!(tracker.session().accumulated_movement(), 1000.0);
    }

    #[test]
    fn test_dispose_silences_everything() {
        let (mut tracker, layer) = running_tracker();
        tracker.dispose();

        assert!(tracker.tick(page(9900.0), at(500)).is_none());
        assert!(tracker.on_page_hide().is_none());
        tracker.on_visibility_change(Visibility::Hidden, at(600));

        assert!(!tracker.session().is_paused());
        assert_eq!(tracker.state(), TrackerState::Disposed);
        assert!(layer.is_empty());
    }

    #[test]
    fn test_measurement_failure_faults_tracker() {
        let (mut tracker, layer) = running_tracker();
        let clock = ManualClock::new(start());
        let mut broken = || -> Result<ScrollSample, TrackerError> {
            Err(TrackerError::Measurement("document body missing".to_string()))
        };

        assert!(tracker.poll(&mut broken, &clock).is_none());
        assert_eq!(tracker.state(), TrackerState::Faulted);
        assert!(tracker.on_page_hide().is_none());
        assert!(layer.is_empty());
    }

    #[test]
    fn test_panicking_host_faults_tracker() {
        let (mut tracker, layer) = running_tracker();
        let clock = ManualClock::new(start());
        let mut broken = || -> Result<ScrollSample, TrackerError> { panic!("document.body is null") };

        assert!(tracker.poll(&mut broken, &clock).is_none());
        assert_eq!(tracker.state(), TrackerState::Faulted);

        clock.advance_ms(500);
        assert!(tracker.tick(page(9000.0), clock.now()).is_none());
        assert!(tracker.on_page_hide().is_none());
        assert!(layer.is_empty());
    }

    #[test]
    fn test_new_starts_session_at_system_time() {
        let before = SystemClock.now();
        let tracker = ReaderTracker::new(TrackerConfig::default(), DataLayer::new());
        let after = SystemClock.now();

        let basis = tracker.session().last_sample_at();
        assert!(basis >= before && basis <= after);
    }

    #[test]
    fn test_panic_message_extracted() {
        let payload = panic::catch_unwind(|| panic!("body {}", "missing")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "host panicked: body missing");
    }

    #[test]
    fn test_poll_uses_host_and_clock() {
        let (mut tracker, layer) = running_tracker();
        let clock = ManualClock::new(start());
        let mut offset = 0.0;
        let mut host = || {
            offset += 2500.0;
            Ok::<_, TrackerError>(page(offset))
        };

        let mut published = None;
        for _ in 0..4 {
            clock.advance_ms(500);
            published = published.or(tracker.poll(&mut host, &clock));
        }

        let record = published.unwrap();
        assert_eq!(record.reader_type, ReaderType::Skimmer);
        assert_eq!(tracker.ticks(), 4);
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn test_paused_poll_skips_measurement() {
        let (mut tracker, _layer) = running_tracker();
        let clock = ManualClock::new(start());
        let mut measured = 0;
        let mut host = || {
            measured += 1;
            Ok::<_, TrackerError>(page(0.0))
        };

        tracker.on_visibility_change(Visibility::Hidden, start());
        tracker.poll(&mut host, &clock);
        tracker.poll(&mut host, &clock);

        assert_eq!(tracker.ticks(), 2);
        drop(host);
        assert_eq!(measured, 0);
    }

    #[test]
    fn test_invalid_config_sanitized() {
        let config = TrackerConfig {
            speed_standard: f64::INFINITY,
            event_name: String::new(),
            ..TrackerConfig::default()
        };
        let tracker = ReaderTracker::new(config, DataLayer::new());

        assert_eq!(tracker.config(), &TrackerConfig::default());
    }
}
