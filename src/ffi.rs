//! FFI bindings for Storefront Flux
//!
//! This module provides C-compatible functions for calling Flux from a host
//! runtime. All functions use C strings (null-terminated) and return allocated
//! memory that must be freed by the caller using `flux_free_string`.
//!
//! Pipeline functions take the current time from the system clock.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::Utc;
use serde::Serialize;

use crate::behavior::{
    Batch, BufferSink, EventPipeline, EventRecord, FlushTrigger, HandleOutcome, MemoryStore,
    PushOutcome, RawInteraction,
};
use crate::config::FluxConfig;
use crate::error::FluxError;
use crate::pipeline::visit_to_decision;
use tracing::warn;

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

/// Set the last error message
fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

/// Clear the last error message
fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Return the JSON on success, or record the error and return NULL
fn json_or_null(result: Result<String, FluxError>) -> *mut c_char {
    match result {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Resolve visit JSON to decision JSON.
///
/// # Safety
/// - `visit_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `flux_free_string`.
/// - Returns NULL on error; call `flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn flux_resolve_visit(visit_json: *const c_char) -> *mut c_char {
    clear_last_error();

    let json_str = match cstr_to_string(visit_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid visit JSON string pointer");
            return ptr::null_mut();
        }
    };

    json_or_null(visit_to_decision(&json_str))
}

// ============================================================================
// Stateful Pipeline API
// ============================================================================

/// Opaque handle to an EventPipeline
pub struct FluxPipelineHandle {
    pipeline: EventPipeline,
    sink: BufferSink,
}

impl FluxPipelineHandle {
    fn new(config: &FluxConfig) -> Self {
        let now = Utc::now();
        let sink = BufferSink::new();
        let mut pipeline = EventPipeline::new(config, MemoryStore::new(), sink.clone(), now);
        pipeline.attach(now);
        Self { pipeline, sink }
    }

    fn destroy(&mut self) -> Vec<Batch> {
        self.pipeline.destroy(Utc::now());
        self.sink.drain()
    }
}

/// Null-check a handle, recording the error
unsafe fn handle_mut<'a>(pipeline: *mut FluxPipelineHandle) -> Option<&'a mut FluxPipelineHandle> {
    if pipeline.is_null() {
        set_last_error("Null pipeline pointer");
        return None;
    }
    Some(&mut *pipeline)
}

fn batches_json(batches: &[Batch]) -> *mut c_char {
    json_or_null(serde_json::to_string(batches).map_err(FluxError::from))
}

#[derive(Serialize)]
struct HandleResponse<'a> {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<&'a EventRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    push: Option<&'static str>,
    /// Batches flushed while handling this interaction
    batches: Vec<Batch>,
}

fn push_label(push: &PushOutcome) -> &'static str {
    match push {
        PushOutcome::Queued => "queued",
        PushOutcome::Flushed(_) => "flushed",
        PushOutcome::Duplicate => "duplicate",
        PushOutcome::Closed => "closed",
    }
}

/// Create a pipeline with capture attached.
///
/// # Safety
/// - `config_json` must be a valid null-terminated C string, or NULL for defaults.
/// - Returns a pointer that must be freed with `flux_pipeline_free`.
/// - Returns NULL on error; call `flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn flux_pipeline_new(config_json: *const c_char) -> *mut FluxPipelineHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        FluxConfig::default()
    } else {
        let json_str = match cstr_to_string(config_json) {
            Some(s) => s,
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        };
        match FluxConfig::from_json(&json_str) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    Box::into_raw(Box::new(FluxPipelineHandle::new(&config)))
}

/// Free a pipeline, destroying it first.
///
/// Call `flux_pipeline_destroy` beforehand to receive the final batch; a
/// batch produced here has no caller left to take it and is logged as lost.
///
/// # Safety
/// - `pipeline` must be a valid pointer returned by `flux_pipeline_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn flux_pipeline_free(pipeline: *mut FluxPipelineHandle) {
    if !pipeline.is_null() {
        let mut handle = Box::from_raw(pipeline);
        let lost = handle.destroy();
        if !lost.is_empty() {
            let events: usize = lost.iter().map(Batch::event_count).sum();
            warn!(events, "pipeline freed before destroy; final batch dropped");
        }
    }
}

/// Handle one interaction JSON and return the outcome JSON.
///
/// # Safety
/// - `pipeline` must be a valid pointer returned by `flux_pipeline_new`.
/// - `interaction_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `flux_free_string`.
/// - Returns NULL on error; call `flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn flux_pipeline_handle(
    pipeline: *mut FluxPipelineHandle,
    interaction_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if pipeline.is_null() {
        set_last_error("Null pipeline pointer");
        return ptr::null_mut();
    }

    let handle = &mut *pipeline;

    let json_str = match cstr_to_string(interaction_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid interaction JSON string pointer");
            return ptr::null_mut();
        }
    };

    let result = serde_json::from_str::<RawInteraction>(&json_str)
        .map_err(|e| FluxError::ParseError(format!("Failed to parse interaction: {}", e)))
        .and_then(|interaction| {
            let outcome = handle.pipeline.handle(&interaction);
            let batches = handle.sink.drain();
            let response = match &outcome {
                HandleOutcome::NotAttached => HandleResponse {
                    outcome: "not_attached",
                    record: None,
                    push: None,
                    batches,
                },
                HandleOutcome::Ignored => HandleResponse {
                    outcome: "ignored",
                    record: None,
                    push: None,
                    batches,
                },
                HandleOutcome::Recorded { record, push } => HandleResponse {
                    outcome: "recorded",
                    record: Some(record),
                    push: Some(push_label(push)),
                    batches,
                },
            };
            Ok(serde_json::to_string(&response)?)
        });

    json_or_null(result)
}

/// Flush the queue and return the delivered batches as a JSON array.
///
/// # Safety
/// - `pipeline` must be a valid pointer returned by `flux_pipeline_new`.
/// - `trigger` must be a valid null-terminated C string naming a flush
///   trigger (`manual`, `visibility_hidden`, ...), or NULL for `manual`.
/// - Returns a newly allocated string that must be freed with `flux_free_string`.
/// - Returns NULL on error; call `flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn flux_pipeline_flush(
    pipeline: *mut FluxPipelineHandle,
    trigger: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if pipeline.is_null() {
        set_last_error("Null pipeline pointer");
        return ptr::null_mut();
    }

    let handle = &mut *pipeline;

    let trigger = if trigger.is_null() {
        FlushTrigger::Manual
    } else {
        let parsed = cstr_to_string(trigger)
            .ok_or_else(|| FluxError::ParseError("Invalid trigger string pointer".to_string()))
            .and_then(|s| s.parse::<FlushTrigger>());
        match parsed {
            Ok(trigger) => trigger,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        }
    };

    handle.pipeline.flush(trigger, Utc::now());
    batches_json(&handle.sink.drain())
}

/// Fire due interval and idle timers and return the delivered batches as a
/// JSON array. Hosts call this from their own timer.
///
/// # Safety
/// - `pipeline` must be a valid pointer returned by `flux_pipeline_new`.
/// - Returns a newly allocated string that must be freed with `flux_free_string`.
/// - Returns NULL on error; call `flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn flux_pipeline_tick(pipeline: *mut FluxPipelineHandle) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle_mut(pipeline) else {
        return ptr::null_mut();
    };

    handle.pipeline.tick(Utc::now());
    batches_json(&handle.sink.drain())
}

/// Destroy the pipeline: one final `manual` flush, then capture and timers
/// stop. Returns the delivered batches as a JSON array; calling it again
/// returns an empty array. The handle must still be freed.
///
/// # Safety
/// - `pipeline` must be a valid pointer returned by `flux_pipeline_new`.
/// - Returns a newly allocated string that must be freed with `flux_free_string`.
/// - Returns NULL on error; call `flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn flux_pipeline_destroy(pipeline: *mut FluxPipelineHandle) -> *mut c_char {
    clear_last_error();

    let Some(handle) = handle_mut(pipeline) else {
        return ptr::null_mut();
    };

    batches_json(&handle.destroy())
}

/// Get ledger statistics as JSON.
///
/// # Safety
/// - `pipeline` must be a valid pointer returned by `flux_pipeline_new`.
/// - Returns a newly allocated string that must be freed with `flux_free_string`.
/// - Returns NULL on error; call `flux_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn flux_pipeline_stats(pipeline: *const FluxPipelineHandle) -> *mut c_char {
    clear_last_error();

    if pipeline.is_null() {
        set_last_error("Null pipeline pointer");
        return ptr::null_mut();
    }

    let handle = &*pipeline;
    json_or_null(serde_json::to_string(&handle.pipeline.stats()).map_err(FluxError::from))
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by Flux functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a Flux function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn flux_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next Flux function call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn flux_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the Flux library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn flux_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
