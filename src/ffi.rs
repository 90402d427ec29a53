//! FFI bindings for Reader Tracker
//!
//! C-compatible functions for embedding a tracker in a host page runtime. The
//! host owns the timer and the page listeners and forwards what it observes;
//! published records are collected with `rt_tracker_drain`.
//!
//! Strings returned by these functions must be freed with `rt_free_string`.
//! Timestamps are milliseconds since the Unix epoch.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;

use chrono::{DateTime, TimeZone, Utc};

use crate::config::TrackerConfig;
use crate::host::{ReadyState, ScrollSample, Visibility};
use crate::queue::DataLayer;
use crate::tracker::ReaderTracker;
use crate::tracker_error;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Run a tracker operation, containing any panic so it never unwinds into the host.
fn guarded<T>(operation: &str, default: T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            tracker_error!("panic contained in {}", operation);
            set_last_error(&format!("internal fault in {}", operation));
            default
        }
    }
}

/// Opaque handle to a tracker and its event queue
pub struct ReaderTrackerHandle {
    tracker: ReaderTracker<DataLayer>,
    layer: DataLayer,
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Create a tracker.
///
/// `config_json` may be NULL; malformed or invalid options fall back to
/// their defaults. `started_at_ms` is the session's time basis.
///
/// # Safety
/// - `config_json` must be NULL or a valid null-terminated C string.
/// - Must be freed with `rt_tracker_free`.
/// - Returns NULL on error; call `rt_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rt_tracker_new(
    config_json: *const c_char,
    started_at_ms: i64,
) -> *mut ReaderTrackerHandle {
    clear_last_error();

    let Some(started_at) = millis_to_utc(started_at_ms) else {
        set_last_error("Invalid start timestamp");
        return ptr::null_mut();
    };

    let config = match cstr_to_string(config_json) {
        Some(json) => TrackerConfig::from_json(&json).unwrap_or_default(),
        None => TrackerConfig::default(),
    };

    let layer = DataLayer::new();
    let tracker = ReaderTracker::with_start_time(config, layer.clone(), started_at);
    Box::into_raw(Box::new(ReaderTrackerHandle { tracker, layer }))
}

/// Free a tracker.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `rt_tracker_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn rt_tracker_free(handle: *mut ReaderTrackerHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Start sampling. `ready_state`: 0 = loading, 1 = interactive, 2 = complete.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `rt_tracker_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn rt_tracker_start(handle: *mut ReaderTrackerHandle, ready_state: i32) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }

    let ready = match ready_state {
        0 => ReadyState::Loading,
        1 => ReadyState::Interactive,
        2 => ReadyState::Complete,
        other => {
            set_last_error(&format!("Unknown ready state {}", other));
            return -1;
        }
    };

    let handle = &mut *handle;
    guarded("rt_tracker_start", -1, || {
        handle.tracker.start(ready);
        0
    })
}

/// Notify that the document finished loading.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `rt_tracker_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn rt_tracker_document_ready(handle: *mut ReaderTrackerHandle) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }

    let handle = &mut *handle;
    guarded("rt_tracker_document_ready", -1, || {
        handle.tracker.on_document_ready();
        0
    })
}

/// Feed one scroll measurement.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `rt_tracker_new`.
/// - Returns 1 if a record was published, 0 if not, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn rt_tracker_tick(
    handle: *mut ReaderTrackerHandle,
    scroll_top: f64,
    viewport_height: f64,
    document_height: f64,
    now_ms: i64,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }

    let Some(now) = millis_to_utc(now_ms) else {
        set_last_error("Invalid timestamp");
        return -1;
    };

    let handle = &mut *handle;
    let sample = ScrollSample::new(scroll_top, viewport_height, document_height);
    guarded("rt_tracker_tick", -1, || {
        i32::from(handle.tracker.tick(sample, now).is_some())
    })
}

/// Notify a visibility change (`visible` non-zero = visible).
///
/// # Safety
/// - `handle` must be a valid pointer returned by `rt_tracker_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn rt_tracker_visibility(
    handle: *mut ReaderTrackerHandle,
    visible: i32,
    now_ms: i64,
) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }

    let Some(now) = millis_to_utc(now_ms) else {
        set_last_error("Invalid timestamp");
        return -1;
    };

    let visibility = if visible != 0 {
        Visibility::Visible
    } else {
        Visibility::Hidden
    };

    let handle = &mut *handle;
    guarded("rt_tracker_visibility", -1, || {
        handle.tracker.on_visibility_change(visibility, now);
        0
    })
}

/// Notify page teardown.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `rt_tracker_new`.
/// - Returns 1 if the fallback record was published, 0 if not, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn rt_tracker_page_hide(handle: *mut ReaderTrackerHandle) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }

    let handle = &mut *handle;
    guarded("rt_tracker_page_hide", -1, || {
        i32::from(handle.tracker.on_page_hide().is_some())
    })
}

/// Detach the tracker from the page; nothing is published afterwards.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `rt_tracker_new`.
/// - Returns 0 on success, -1 on error.
#[no_mangle]
pub unsafe extern "C" fn rt_tracker_dispose(handle: *mut ReaderTrackerHandle) -> i32 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return -1;
    }

    (*handle).tracker.dispose();
    0
}

/// Remove every queued entry and return them as a JSON array.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `rt_tracker_new`.
/// - Returns a newly allocated string that must be freed with `rt_free_string`.
/// - Returns NULL on error; call `rt_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn rt_tracker_drain(handle: *mut ReaderTrackerHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null tracker pointer");
        return ptr::null_mut();
    }

    let entries = (*handle).layer.drain();
    match serde_json::to_string(&entries) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by tracker functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a tracker function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn rt_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next tracker function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn rt_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn rt_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
