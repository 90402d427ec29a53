//! Reader Tracker - scroll-engagement classification for a single page view
//!
//! A tracker samples scroll position every 500 ms, accumulates scroll
//! distance, elapsed time and maximum depth, and publishes exactly one record
//! per page view labelling the visitor a `reader`, `skimmer` or `bouncer`:
//! sampler → classifier → event queue.
//!
//! ## Modules
//!
//! - **Core**: [`tracker::ReaderTracker`] with its [`sampler`] and [`classifier`]
//! - **Host seams**: [`host`] inputs and the [`queue`] output
//! - **Replay**: run recorded page traces offline ([`trace`])
//! - **Runtime** (feature `runtime`): async 500 ms sampling loop on tokio

pub mod classifier;
pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod queue;
pub mod sampler;
pub mod session;
pub mod trace;
pub mod tracker;
pub mod types;

#[cfg(feature = "runtime")]
pub mod runtime;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::TrackerConfig;
pub use error::TrackerError;
pub use host::{ReadyState, ScrollSample, Visibility};
pub use queue::{DataLayer, EventSink};
pub use tracker::{ReaderTracker, TrackerState};
pub use types::{EngagementRecord, ReaderType, Trigger};

#[cfg(feature = "runtime")]
pub use runtime::{PageSignal, PageSignals, SamplingLoop};

/// Library version
pub const TRACKER_VERSION: &str = env!("CARGO_PKG_VERSION");
