//! C FFI bindings for u-attribution.
//!
//! # Design
//!
//! - **Opaque handle**: `*mut AttributionSession` owns the current dataset
//! - **JSON out-parameters**: results are written to `*mut *mut c_char` and
//!   released with `attribution_string_free`
//! - **Integer status codes**: 0 = success, negative = error
//! - **Thread-local error message**: `attribution_last_error()`
//! - **`catch_unwind`**: every entry point is wrapped so panics never cross
//!   the boundary
//!
//! JSON output never contains NaN or Infinity.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic;
use std::ptr;
use std::slice;

use serde::Serialize;

use crate::config::AttributionConfig;
use crate::csv_parser::CsvParser;
use crate::error::AttributionError;
use crate::estimator::{ColumnSelection, LinearBackdoorModel};
use crate::pipeline::analyze;
use crate::sanitize::{finite, safe_float, NumericValue};
use crate::session::DatasetRepository;
use crate::uplift::compute_uplift_summary_with;

// ── Error handling ────────────────────────────────────────────────────

/// Status codes returned by FFI functions.
pub const ATTRIBUTION_OK: i32 = 0;
pub const ATTRIBUTION_ERR_NULL_PTR: i32 = -1;
pub const ATTRIBUTION_ERR_INVALID_INPUT: i32 = -2;
pub const ATTRIBUTION_ERR_PARSE_FAILED: i32 = -3;
pub const ATTRIBUTION_ERR_ANALYSIS_FAILED: i32 = -4;
pub const ATTRIBUTION_ERR_NO_DATASET: i32 = -5;
pub const ATTRIBUTION_ERR_PANIC: i32 = -99;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = CString::new(msg).ok();
    });
}

/// Records `e` as the last error and maps it to a status code.
fn fail(e: &AttributionError) -> i32 {
    set_last_error(&e.to_string());
    match e {
        AttributionError::CsvParse { .. } | AttributionError::UnsupportedFormat { .. } => {
            ATTRIBUTION_ERR_PARSE_FAILED
        }
        AttributionError::NoDataset => ATTRIBUTION_ERR_NO_DATASET,
        AttributionError::ColumnNotFound { .. }
        | AttributionError::ConfigParse { .. }
        | AttributionError::ConfigInvalid { .. } => ATTRIBUTION_ERR_INVALID_INPUT,
        _ => ATTRIBUTION_ERR_ANALYSIS_FAILED,
    }
}

/// Runs `f`, converting a panic into `ATTRIBUTION_ERR_PANIC`.
fn guarded(name: &str, f: impl FnOnce() -> i32) -> i32 {
    panic::catch_unwind(panic::AssertUnwindSafe(f)).unwrap_or_else(|_| {
        set_last_error(&format!("panic in {name}"));
        ATTRIBUTION_ERR_PANIC
    })
}

/// Borrows a C string as UTF-8.
///
/// # Safety
/// `p` must be null or a valid null-terminated string that outlives `'a`.
unsafe fn read_str<'a>(p: *const c_char, what: &str) -> Result<&'a str, i32> {
    if p.is_null() {
        set_last_error(&format!("null {what} pointer"));
        return Err(ATTRIBUTION_ERR_NULL_PTR);
    }
    unsafe { CStr::from_ptr(p) }.to_str().map_err(|e| {
        set_last_error(&format!("{what} is not valid UTF-8: {e}"));
        ATTRIBUTION_ERR_INVALID_INPUT
    })
}

/// Serializes `value` into a newly allocated C string at `*out`.
///
/// # Safety
/// `out` must be null or valid for writes.
unsafe fn write_json<T: Serialize>(value: &T, out: *mut *mut c_char) -> i32 {
    if out.is_null() {
        set_last_error("null output pointer");
        return ATTRIBUTION_ERR_NULL_PTR;
    }
    let json = match serde_json::to_string(value) {
        Ok(s) => s,
        Err(e) => return fail(&e.into()),
    };
    match CString::new(json) {
        Ok(c) => {
            unsafe { *out = c.into_raw() };
            ATTRIBUTION_OK
        }
        Err(e) => {
            set_last_error(&format!("JSON contains interior NUL: {e}"));
            ATTRIBUTION_ERR_ANALYSIS_FAILED
        }
    }
}

/// Returns the last error message, or null if no error.
/// The returned string is valid until the next FFI call on this thread.
///
/// # Safety
/// The caller must not free the returned pointer.
#[no_mangle]
pub extern "C" fn attribution_last_error() -> *const c_char {
    LAST_ERROR.with(|cell| {
        let borrow = cell.borrow();
        match borrow.as_ref() {
            Some(cstr) => cstr.as_ptr(),
            None => ptr::null(),
        }
    })
}

/// Clears the last error message.
#[no_mangle]
pub extern "C" fn attribution_clear_error() {
    LAST_ERROR.with(|cell| {
        *cell.borrow_mut() = None;
    });
}

/// Frees a string returned through a JSON out-parameter.
///
/// # Safety
/// `s` must come from this library, or be null. Each string is freed once.
#[no_mangle]
pub unsafe extern "C" fn attribution_string_free(s: *mut c_char) {
    if !s.is_null() {
        let _ = unsafe { CString::from_raw(s) };
    }
}

/// Returns the library version. Do not free.
#[no_mangle]
pub extern "C" fn attribution_version() -> *const c_char {
    c"0.1.0".as_ptr()
}

// ── Session (opaque handle) ──────────────────────────────────────────

/// Opaque handle holding configuration and the current dataset.
pub struct AttributionSession {
    repo: DatasetRepository,
    config: AttributionConfig,
    model: LinearBackdoorModel,
}

impl AttributionSession {
    fn new(config: AttributionConfig) -> Self {
        Self {
            repo: DatasetRepository::from_config(&config.store)
                .with_retail_seed(config.simulation.seed),
            model: config.model(),
            config,
        }
    }
}

/// Creates a session.
///
/// `config_toml` may be null for defaults; otherwise it is a TOML document
/// in the `AttributionConfig` layout. `ATTRIBUTION_*` environment variables
/// override either. Returns null on invalid configuration.
///
/// # Safety
/// `config_toml` must be null or a valid null-terminated string.
/// The returned handle must be freed with `attribution_session_free`.
#[no_mangle]
pub unsafe extern "C" fn attribution_session_new(
    config_toml: *const c_char,
) -> *mut AttributionSession {
    let mut session = ptr::null_mut();
    guarded("attribution_session_new", || {
        let config = if config_toml.is_null() {
            AttributionConfig::load(None)
        } else {
            let toml = match unsafe { read_str(config_toml, "config") } {
                Ok(s) => s,
                Err(code) => return code,
            };
            AttributionConfig::from_toml(toml).and_then(|mut c| {
                c.apply_env_overrides(std::env::vars());
                c.validate().map(|()| c)
            })
        };
        match config {
            Ok(config) => {
                session = Box::into_raw(Box::new(AttributionSession::new(config)));
                ATTRIBUTION_OK
            }
            Err(e) => fail(&e),
        }
    });
    session
}

/// Frees a session.
///
/// # Safety
/// `session` must come from `attribution_session_new`, or be null.
#[no_mangle]
pub unsafe extern "C" fn attribution_session_free(session: *mut AttributionSession) {
    if !session.is_null() {
        let _ = unsafe { Box::from_raw(session) };
    }
}

/// Borrows the session behind a handle.
///
/// # Safety
/// `session` must be null or a live handle not aliased for the call.
unsafe fn session_mut<'a>(session: *mut AttributionSession) -> Result<&'a mut AttributionSession, i32> {
    if session.is_null() {
        set_last_error("null session");
        return Err(ATTRIBUTION_ERR_NULL_PTR);
    }
    Ok(unsafe { &mut *session })
}

/// Loads an uploaded file into the session. File names containing "retail"
/// are aggregated to customer level first.
///
/// On success `*out_json` receives `{"columns": [...], "rows": n,
/// "persistence": {...}}`.
///
/// # Safety
/// - `session` must be a valid handle.
/// - `data` must point to `len` readable bytes.
/// - `filename` must be a valid null-terminated string.
/// - `out_json` must be valid for writes; free the result with
///   `attribution_string_free`.
#[no_mangle]
pub unsafe extern "C" fn attribution_session_load(
    session: *mut AttributionSession,
    data: *const u8,
    len: usize,
    filename: *const c_char,
    out_json: *mut *mut c_char,
) -> i32 {
    guarded("attribution_session_load", || {
        let session = match unsafe { session_mut(session) } {
            Ok(s) => s,
            Err(code) => return code,
        };
        if data.is_null() {
            set_last_error("null data pointer");
            return ATTRIBUTION_ERR_NULL_PTR;
        }
        let filename = match unsafe { read_str(filename, "filename") } {
            Ok(s) => s,
            Err(code) => return code,
        };
        let bytes = unsafe { slice::from_raw_parts(data, len) };
        match session.repo.load(bytes, filename) {
            Ok(report) => unsafe { write_json(&report, out_json) },
            Err(e) => fail(&e),
        }
    })
}

/// Replaces the session dataset with simulated data.
///
/// `samples == 0` uses the configured sample count.
///
/// # Safety
/// `session` must be a valid handle. `out_json` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn attribution_session_simulate(
    session: *mut AttributionSession,
    samples: u32,
    out_json: *mut *mut c_char,
) -> i32 {
    guarded("attribution_session_simulate", || {
        let session = match unsafe { session_mut(session) } {
            Ok(s) => s,
            Err(code) => return code,
        };
        let n = if samples == 0 {
            session.config.simulation.samples
        } else {
            samples as usize
        };
        let seed = session.config.simulation.seed;
        match session.repo.simulate(n, seed) {
            Ok(report) => unsafe { write_json(&report, out_json) },
            Err(e) => fail(&e),
        }
    })
}

/// Writes `{"columns": [...]}` for the current dataset, restoring the last
/// snapshot if nothing is loaded.
///
/// # Safety
/// `session` must be a valid handle. `out_json` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn attribution_session_columns(
    session: *mut AttributionSession,
    out_json: *mut *mut c_char,
) -> i32 {
    #[derive(Serialize)]
    struct Columns<'a> {
        columns: &'a [String],
    }

    guarded("attribution_session_columns", || {
        let session = match unsafe { session_mut(session) } {
            Ok(s) => s,
            Err(code) => return code,
        };
        match session.repo.current_or_restore() {
            Ok(df) => unsafe {
                write_json(
                    &Columns {
                        columns: df.column_names(),
                    },
                    out_json,
                )
            },
            Err(e) => fail(&e),
        }
    })
}

/// Runs a causal analysis on the current dataset.
///
/// `request_json` is `{"treatment": "...", "outcome": "...",
/// "confounders": [...]}`. On success `*out_json` receives
/// `{"result": {...}, "graph_dot": "digraph {...}"}`.
///
/// # Safety
/// `session` must be a valid handle. `request_json` must be a valid
/// null-terminated string. `out_json` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn attribution_session_analyze(
    session: *mut AttributionSession,
    request_json: *const c_char,
    out_json: *mut *mut c_char,
) -> i32 {
    guarded("attribution_session_analyze", || {
        let session = match unsafe { session_mut(session) } {
            Ok(s) => s,
            Err(code) => return code,
        };
        let request = match unsafe { read_str(request_json, "request") } {
            Ok(s) => s,
            Err(code) => return code,
        };
        let selection: ColumnSelection = match serde_json::from_str(request) {
            Ok(s) => s,
            Err(e) => {
                set_last_error(&format!("invalid analysis request: {e}"));
                return ATTRIBUTION_ERR_INVALID_INPUT;
            }
        };
        let df = match session.repo.current_or_restore() {
            Ok(df) => df,
            Err(e) => return fail(&e),
        };
        match analyze(&df, &selection, &session.model, &session.config) {
            Ok(response) => unsafe { write_json(&response, out_json) },
            Err(e) => fail(&e),
        }
    })
}

// ── Stateless helpers ────────────────────────────────────────────────

/// Computes the uplift summary of a CSV document.
///
/// `*out_json` receives the summary object, or `null` when it is absent
/// (missing column, no numeric rows, or an empty partition).
///
/// # Safety
/// All string arguments must be valid null-terminated strings. `out_json`
/// must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn attribution_uplift_csv(
    csv_data: *const c_char,
    treatment: *const c_char,
    outcome: *const c_char,
    out_json: *mut *mut c_char,
) -> i32 {
    guarded("attribution_uplift_csv", || {
        let strings = unsafe {
            (
                read_str(csv_data, "csv_data"),
                read_str(treatment, "treatment"),
                read_str(outcome, "outcome"),
            )
        };
        let (csv, treatment, outcome) = match strings {
            (Ok(c), Ok(t), Ok(o)) => (c, t, o),
            (Err(code), _, _) | (_, Err(code), _) | (_, _, Err(code)) => return code,
        };
        let df = match CsvParser::new().parse_str(csv) {
            Ok(df) => df,
            Err(e) => return fail(&e),
        };
        let summary =
            compute_uplift_summary_with(&df, treatment, outcome, &Default::default());
        unsafe { write_json(&summary, out_json) }
    })
}

/// Sanitizes a single float.
///
/// Returns 1 and writes `value` to `*out` when it is finite; returns 0 and
/// leaves `*out` untouched for NaN and ±Infinity.
///
/// # Safety
/// `out` must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn attribution_safe_float(value: f64, out: *mut f64) -> i32 {
    if out.is_null() {
        set_last_error("null output pointer");
        return ATTRIBUTION_ERR_NULL_PTR;
    }
    match finite(value) {
        Some(v) => {
            unsafe { *out = v };
            1
        }
        None => 0,
    }
}

fn numeric_from_json(value: &serde_json::Value) -> NumericValue {
    use serde_json::Value;
    match value {
        Value::Null | Value::Object(_) => NumericValue::Null,
        Value::Bool(b) => NumericValue::Bool(*b),
        Value::Number(n) => n
            .as_i64()
            .map(NumericValue::Int)
            .or_else(|| n.as_u64().map(NumericValue::UInt))
            .or_else(|| n.as_f64().map(NumericValue::Float))
            .unwrap_or(NumericValue::Null),
        Value::String(s) => NumericValue::Text(s.clone()),
        Value::Array(items) => NumericValue::Array(items.iter().map(numeric_from_json).collect()),
    }
}

/// Sanitizes an arbitrary JSON value (number, numeric string, boolean, or
/// nested array) into finite numbers and nulls.
///
/// # Safety
/// `value_json` must be a valid null-terminated string. `out_json` must be
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn attribution_safe_float_json(
    value_json: *const c_char,
    out_json: *mut *mut c_char,
) -> i32 {
    guarded("attribution_safe_float_json", || {
        let text = match unsafe { read_str(value_json, "value_json") } {
            Ok(s) => s,
            Err(code) => return code,
        };
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                set_last_error(&format!("invalid JSON: {e}"));
                return ATTRIBUTION_ERR_PARSE_FAILED;
            }
        };
        unsafe { write_json(&safe_float(&numeric_from_json(&value)), out_json) }
    })
}
