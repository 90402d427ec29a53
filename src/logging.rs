//! Conditional diagnostic logging.
//!
//! Trackers only trace when their config has `debug` set. The flag is checked
//! at the call site so disabled traces never format their arguments.
//!
//! ```ignore
//! use crate::tracker_debug;
//!
//! tracker_debug!(self.config.debug, "sampled ratio {:.2}", ratio);
//! ```

/// Target used for every log line emitted by this crate
pub const LOG_TARGET: &str = "reader_tracker";

/// Debug-level trace gated on a runtime flag.
#[macro_export]
macro_rules! tracker_debug {
    ($enabled:expr, $($arg:tt)*) => {
        if $enabled {
            log::debug!(target: $crate::logging::LOG_TARGET, $($arg)*);
        }
    };
}

/// Error-level log, always on. Used for contained faults.
#[macro_export]
macro_rules! tracker_error {
    ($($arg:tt)*) => {
        log::error!(target: $crate::logging::LOG_TARGET, $($arg)*);
    };
}
