//! Recorded page traces
//!
//! A trace is the offline equivalent of one page view: a time-ordered list of
//! [`PageEvent`]s (scroll samples and lifecycle signals) that can be replayed
//! through a fresh tracker. Traces are read as NDJSON or as a JSON array.
//!
//! ```json
//! {"at": "2024-01-15T14:00:00Z", "kind": "start", "ready_state": "complete"}
//! {"at": "2024-01-15T14:00:00.500Z", "kind": "sample", "scroll_top": 0, "viewport_height": 900, "document_height": 5400}
//! {"at": "2024-01-15T14:00:07Z", "kind": "visibility", "visibility": "hidden"}
//! {"at": "2024-01-15T14:02:00Z", "kind": "page_hide"}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::host::{ReadyState, ScrollSample, Visibility};
use crate::queue::DataLayer;
use crate::session::SessionRecord;
use crate::tracker::{ReaderTracker, TrackerState};
use crate::types::EngagementRecord;

/// Trace format identifier
pub const TRACE_VERSION: &str = "reader_tracker.page_trace.v1";

/// What happened at a point in a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageEventKind {
    /// Script initialised; `ready_state` is the document state at that moment
    Start { ready_state: ReadyState },
    /// Initial document load finished
    DocumentReady,
    /// Scroll geometry measured by the sampler
    Sample(ScrollSample),
    /// Visibility changed
    Visibility { visibility: Visibility },
    /// Page torn down
    PageHide,
}

/// A timestamped trace entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: PageEventKind,
}

/// Replay behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayOptions {
    /// Treat the end of the trace as a teardown when the trace has none
    pub teardown_at_end: bool,
}

/// Result of replaying one trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayOutcome {
    pub page_view_id: Uuid,
    /// Record published during the replay, if any
    pub record: Option<EngagementRecord>,
    /// Tracker state after the last event
    pub state: TrackerState,
    /// Final session snapshot
    pub session: SessionRecord,
    /// Sampler ticks processed
    pub ticks: u64,
    /// Trace events consumed
    pub events: usize,
}

/// Parse an NDJSON trace, one event per non-empty line
pub fn parse_ndjson(input: &str) -> Result<Vec<PageEvent>, TrackerError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line.trim())
                .map_err(|e| TrackerError::Trace(format!("line {}: {}", i + 1, e)))
        })
        .collect()
}

/// Parse a JSON array trace
pub fn parse_array(input: &str) -> Result<Vec<PageEvent>, TrackerError> {
    Ok(serde_json::from_str(input)?)
}

/// Replay `events` through a fresh tracker on a virtual clock.
///
/// The session's time basis is the first event's timestamp. A trace without a
/// `start` event is started as an already-loaded document. Events must be in
/// non-decreasing time order.
pub fn replay(
    config: TrackerConfig,
    events: &[PageEvent],
    options: ReplayOptions,
) -> Result<ReplayOutcome, TrackerError> {
    let first = events
        .first()
        .ok_or_else(|| TrackerError::Trace("trace contains no events".to_string()))?;

    if let Some(pos) = events.windows(2).position(|pair| pair[1].at < pair[0].at) {
        return Err(TrackerError::Trace(format!(
            "event {} at {} precedes the event before it",
            pos + 2,
            events[pos + 1].at.to_rfc3339()
        )));
    }

    let layer = DataLayer::new();
    let mut tracker = ReaderTracker::with_start_time(config, layer.clone(), first.at);

    let has_start = events
        .iter()
        .any(|e| matches!(e.kind, PageEventKind::Start { .. }));
    if !has_start {
        tracker.start(ReadyState::Complete);
    }

    let mut record = None;
    for event in events {
        let published = match event.kind {
            PageEventKind::Start { ready_state } => {
                tracker.start(ready_state);
                None
            }
            PageEventKind::DocumentReady => {
                tracker.on_document_ready();
                None
            }
            PageEventKind::Sample(sample) => tracker.tick(sample, event.at),
            PageEventKind::Visibility { visibility } => {
                tracker.on_visibility_change(visibility, event.at);
                None
            }
            PageEventKind::PageHide => tracker.on_page_hide(),
        };
        record = record.or(published);
    }

    if options.teardown_at_end {
        record = record.or(tracker.on_page_hide());
    }

    Ok(ReplayOutcome {
        page_view_id: tracker.page_view_id(),
        record,
        state: tracker.state(),
        session: tracker.session().clone(),
        ticks: tracker.ticks(),
        events: events.len(),
    })
}
