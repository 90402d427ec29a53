//! Async sampling loop (feature `runtime`)
//!
//! Drives a [`ReaderTracker`] on a 500 ms tokio interval. Page signals arrive
//! over a channel and are handled between ticks, so a visibility change or a
//! teardown never interleaves with a sample. The loop ends on teardown, on a
//! host fault, when every [`PageSignals`] handle is dropped, or when its
//! [`CancellationToken`] is cancelled; the last two dispose the tracker.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::host::{Clock, PageHost, Visibility};
use crate::queue::EventSink;
use crate::sampler::SAMPLE_INTERVAL_MS;
use crate::tracker::{ReaderTracker, TrackerState};
use crate::tracker_debug;

/// Lifecycle signal forwarded from the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSignal {
    DocumentReady,
    Visibility(Visibility),
    PageHide,
}

/// Host-side handle for delivering page signals to a running loop.
///
/// Sends after the loop has ended are dropped silently.
#[derive(Debug, Clone)]
pub struct PageSignals {
    tx: mpsc::UnboundedSender<PageSignal>,
}

impl PageSignals {
    pub fn send(&self, signal: PageSignal) {
        let _ = self.tx.send(signal);
    }

    pub fn document_ready(&self) {
        self.send(PageSignal::DocumentReady);
    }

    pub fn visibility(&self, visibility: Visibility) {
        self.send(PageSignal::Visibility(visibility));
    }

    pub fn page_hide(&self) {
        self.send(PageSignal::PageHide);
    }
}

/// Wall clock anchored to tokio's (pausable) monotonic clock
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin_utc: DateTime<Utc>,
    origin: Instant,
}

impl TokioClock {
    pub fn starting_at(origin_utc: DateTime<Utc>) -> Self {
        Self {
            origin_utc,
            origin: Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().duration_since(self.origin);
        self.origin_utc + chrono::Duration::milliseconds(elapsed.as_millis() as i64)
    }
}

/// Repeating sampling task owning one tracker
pub struct SamplingLoop<H, S: EventSink> {
    tracker: ReaderTracker<S>,
    host: H,
    signals: mpsc::UnboundedReceiver<PageSignal>,
    cancel: CancellationToken,
    clock: TokioClock,
}

impl<H, S> SamplingLoop<H, S>
where
    H: PageHost,
    S: EventSink,
{
    /// Wrap a tracker. Returns the loop, the signal handle and the token that
    /// cancels it.
    pub fn new(tracker: ReaderTracker<S>, host: H) -> (Self, PageSignals, CancellationToken) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let clock = TokioClock::starting_at(tracker.session().last_sample_at());
        let sampling_loop = Self {
            tracker,
            host,
            signals: rx,
            cancel: cancel.clone(),
            clock,
        };
        (sampling_loop, PageSignals { tx }, cancel)
    }

    /// Run until teardown, fault, disposal or cancellation; hands the tracker back.
    pub async fn run(self) -> ReaderTracker<S> {
        let Self {
            mut tracker,
            mut host,
            mut signals,
            cancel,
            clock,
        } = self;

        let mut ticker = tokio::time::interval(Duration::from_millis(SAMPLE_INTERVAL_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracker.dispose();
                    break;
                }
                signal = signals.recv() => match signal {
                    Some(PageSignal::DocumentReady) => tracker.on_document_ready(),
                    Some(PageSignal::Visibility(visibility)) => {
                        tracker.on_visibility_change(visibility, clock.now());
                    }
                    Some(PageSignal::PageHide) => {
                        tracker.on_page_hide();
                        break;
                    }
                    None => {
                        tracker.dispose();
                        break;
                    }
                },
                _ = ticker.tick() => {
                    tracker.poll(&mut host, &clock);
                    if tracker.state() == TrackerState::Faulted {
                        break;
                    }
                }
            }
        }

        tracker_debug!(
            tracker.config().debug,
            "[{}] sampling loop finished after {} ticks ({:?})",
            tracker.page_view_id(),
            tracker.ticks(),
            tracker.state()
        );
        tracker
    }
}
