//! Error types for Reader Tracker

use thiserror::Error;

/// Errors that can occur while configuring or driving a tracker.
///
/// None of these ever reach the host page through the lifecycle methods of
/// [`crate::ReaderTracker`]; they surface only from constructors, the trace
/// replay and the host measurement seam.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Measurement failed: {0}")]
    Measurement(String),

    #[error("Invalid page trace: {0}")]
    Trace(String),
}
