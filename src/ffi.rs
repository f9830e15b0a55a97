//! FFI bindings for the health bridge
//!
//! C-compatible functions for hosts that cannot link Rust directly. Arguments
//! and results are null-terminated JSON strings; every returned string is
//! allocated here and must be freed with `hc_free_string`. On failure a
//! function returns NULL and records a message and wire code readable through
//! `hc_last_error` and `hc_last_error_code`.

use serde_json::{json, Value};
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::Arc;

use crate::bridge::{BridgeConfig, HealthConnectBridge};
use crate::envelope::LocalZone;
use crate::error::BridgeError;
use crate::registry::RecordTypeRegistry;
use crate::store::{MemoryStore, MemoryStoreProvider};
use crate::units::{expand_quantity, QuantityKind};

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
    static LAST_ERROR_CODE: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(err: &BridgeError) {
    LAST_ERROR.with(|e| *e.borrow_mut() = CString::new(err.to_string()).ok());
    LAST_ERROR_CODE.with(|c| *c.borrow_mut() = CString::new(err.code()).ok());
}

fn clear_last_error() {
    LAST_ERROR.with(|e| *e.borrow_mut() = None);
    LAST_ERROR_CODE.with(|c| *c.borrow_mut() = None);
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

unsafe fn required_arg(ptr: *const c_char, name: &str) -> Result<String, BridgeError> {
    cstr_to_string(ptr)
        .ok_or_else(|| BridgeError::invalid_argument(format!("Invalid {name} string pointer")))
}

/// JSON argument; a NULL pointer reads as `null`
unsafe fn json_arg(ptr: *const c_char, name: &str) -> Result<Value, BridgeError> {
    match cstr_to_string(ptr) {
        Some(raw) => Ok(serde_json::from_str(&raw)?),
        None if ptr.is_null() => Ok(Value::Null),
        None => Err(BridgeError::invalid_argument(format!(
            "Invalid {name} string pointer"
        ))),
    }
}

fn zone_arg(utc_offset_seconds: i32) -> Result<LocalZone, BridgeError> {
    LocalZone::from_offset_seconds(utc_offset_seconds).ok_or_else(|| {
        BridgeError::invalid_argument(format!("UTC offset out of range: {utc_offset_seconds}"))
    })
}

/// Run a call, mapping its JSON result or error onto the C return convention
fn respond(call: impl FnOnce() -> Result<Value, BridgeError>) -> *mut c_char {
    clear_last_error();
    match call() {
        Ok(value) => string_to_cstr(&value.to_string()),
        Err(e) => {
            set_last_error(&e);
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Stateless API
// ============================================================================

/// Bucket wire records into daily `{dateKey, entry}` envelopes.
///
/// Records are written to a scratch in-memory store and read back through the
/// same path a platform store would use, so both native and manual types work.
/// Records without a `recordType` are tagged with `record_type`.
///
/// # Safety
/// - `record_type` and `records_json` must be valid null-terminated C strings.
/// - `options_json` must be a valid null-terminated C string or NULL.
/// - Returns a newly allocated string that must be freed with `hc_free_string`.
/// - Returns NULL on error; call `hc_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hc_bucket_records(
    record_type: *const c_char,
    records_json: *const c_char,
    options_json: *const c_char,
    utc_offset_seconds: i32,
) -> *mut c_char {
    respond(|| {
        let record_type = required_arg(record_type, "record_type")?;
        let records = json_arg(records_json, "records_json")?;
        let options = json_arg(options_json, "options_json")?;
        let zone = zone_arg(utc_offset_seconds)?;

        let mut records = match records {
            Value::Array(records) => records,
            _ => return Err(BridgeError::invalid_argument("records_json must be an array")),
        };
        for record in records.iter_mut() {
            if let Some(object) = record.as_object_mut() {
                object
                    .entry("recordType")
                    .or_insert_with(|| Value::from(record_type.as_str()));
            }
        }

        let bridge = HealthConnectBridge::new(MemoryStoreProvider::default())
            .with_config(BridgeConfig::default().with_zone(zone));
        bridge.initialize(None)?;
        bridge.insert_records(&records)?;
        bridge.read_bucketed_records(&record_type, &options)
    })
}

/// Expand a `{value, unit}` quantity into every unit of its kind.
///
/// # Safety
/// - `kind` (e.g. `"mass"`) and `quantity_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `hc_free_string`.
/// - Returns NULL on error; call `hc_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn hc_expand_quantity(
    kind: *const c_char,
    quantity_json: *const c_char,
) -> *mut c_char {
    respond(|| {
        let kind: QuantityKind = required_arg(kind, "kind")?.parse()?;
        let quantity = json_arg(quantity_json, "quantity_json")?;
        expand_quantity(kind, Some(&quantity))
    })
}

/// List supported record types with their result tag and bucketing mode.
///
/// # Safety
/// - Returns a newly allocated string that must be freed with `hc_free_string`.
#[no_mangle]
pub unsafe extern "C" fn hc_record_types() -> *mut c_char {
    respond(|| {
        let registry = RecordTypeRegistry::standard();
        let types = registry
            .record_types()
            .map(|record_type| {
                let name = record_type.wire_name();
                Ok(json!({
                    "recordType": name,
                    "resultType": registry.result_type(name)?,
                    "bucketing": registry.bucketing_mode(name)?.as_str(),
                }))
            })
            .collect::<Result<Vec<_>, BridgeError>>()?;
        Ok(Value::Array(types))
    })
}

// ============================================================================
// Stateful Bridge API
// ============================================================================

/// Opaque handle to a bridge over an in-memory store
pub struct HcBridgeHandle {
    bridge: HealthConnectBridge<MemoryStoreProvider>,
}

/// Create an initialized bridge over an empty in-memory store.
///
/// # Safety
/// - Returns a pointer that must be freed with `hc_bridge_free`.
/// - Returns NULL when the offset is out of range.
#[no_mangle]
pub unsafe extern "C" fn hc_bridge_new(utc_offset_seconds: i32) -> *mut HcBridgeHandle {
    clear_last_error();

    let zone = match zone_arg(utc_offset_seconds) {
        Ok(zone) => zone,
        Err(e) => {
            set_last_error(&e);
            return ptr::null_mut();
        }
    };

    let provider = MemoryStoreProvider::new(Arc::new(MemoryStore::default()));
    let bridge =
        HealthConnectBridge::new(provider).with_config(BridgeConfig::default().with_zone(zone));
    if let Err(e) = bridge.initialize(None) {
        set_last_error(&e);
        return ptr::null_mut();
    }
    Box::into_raw(Box::new(HcBridgeHandle { bridge }))
}

/// Free a bridge handle.
///
/// # Safety
/// - `handle` must be a pointer returned by `hc_bridge_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn hc_bridge_free(handle: *mut HcBridgeHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

unsafe fn bridge_ref<'a>(
    handle: *const HcBridgeHandle,
) -> Result<&'a HealthConnectBridge<MemoryStoreProvider>, BridgeError> {
    if handle.is_null() {
        return Err(BridgeError::invalid_argument("Null bridge pointer"));
    }
    Ok(&(*handle).bridge)
}

/// Insert a JSON array of wire records; returns the assigned ids.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `hc_bridge_new`.
/// - `records_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `hc_free_string`.
#[no_mangle]
pub unsafe extern "C" fn hc_bridge_insert_records(
    handle: *const HcBridgeHandle,
    records_json: *const c_char,
) -> *mut c_char {
    respond(|| {
        let bridge = bridge_ref(handle)?;
        let records = match json_arg(records_json, "records_json")? {
            Value::Array(records) => records,
            _ => return Err(BridgeError::invalid_argument("records_json must be an array")),
        };
        Ok(json!(bridge.insert_records(&records)?))
    })
}

/// Read one page of records.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `hc_bridge_new`.
/// - `record_type` must be a valid null-terminated C string; `options_json` may be NULL.
/// - Returns a newly allocated string that must be freed with `hc_free_string`.
#[no_mangle]
pub unsafe extern "C" fn hc_bridge_read_records(
    handle: *const HcBridgeHandle,
    record_type: *const c_char,
    options_json: *const c_char,
) -> *mut c_char {
    respond(|| {
        let bridge = bridge_ref(handle)?;
        let record_type = required_arg(record_type, "record_type")?;
        bridge.read_records(&record_type, &json_arg(options_json, "options_json")?)
    })
}

/// Aggregate over `{recordType, timeRangeFilter, dataOriginFilter?}`.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `hc_bridge_new`.
/// - `options_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `hc_free_string`.
#[no_mangle]
pub unsafe extern "C" fn hc_bridge_aggregate(
    handle: *const HcBridgeHandle,
    options_json: *const c_char,
) -> *mut c_char {
    respond(|| {
        let bridge = bridge_ref(handle)?;
        bridge.aggregate_record(&json_arg(options_json, "options_json")?)
    })
}

/// Daily bucketed read.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `hc_bridge_new`.
/// - `record_type` and `options_json` must be valid null-terminated C strings.
/// - Returns a newly allocated string that must be freed with `hc_free_string`.
#[no_mangle]
pub unsafe extern "C" fn hc_bridge_read_bucketed(
    handle: *const HcBridgeHandle,
    record_type: *const c_char,
    options_json: *const c_char,
) -> *mut c_char {
    respond(|| {
        let bridge = bridge_ref(handle)?;
        let record_type = required_arg(record_type, "record_type")?;
        bridge.read_bucketed_records(&record_type, &json_arg(options_json, "options_json")?)
    })
}

/// Change feed since a token, or since a fresh token for the given filters.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `hc_bridge_new`.
/// - `options_json` must be a valid null-terminated C string or NULL.
/// - Returns a newly allocated string that must be freed with `hc_free_string`.
#[no_mangle]
pub unsafe extern "C" fn hc_bridge_get_changes(
    handle: *const HcBridgeHandle,
    options_json: *const c_char,
) -> *mut c_char {
    respond(|| {
        let bridge = bridge_ref(handle)?;
        bridge.get_changes(&json_arg(options_json, "options_json")?)
    })
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by a bridge function.
///
/// # Safety
/// - `ptr` must be a pointer returned by a bridge function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn hc_free_string(ptr: *mut c_char) {
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
/// - The returned pointer is valid until the next bridge call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if the last call succeeded.
#[no_mangle]
pub unsafe extern "C" fn hc_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the wire code of the last error (e.g. `INVALID_RECORD_TYPE`).
///
/// # Safety
/// Same contract as `hc_last_error`.
#[no_mangle]
pub unsafe extern "C" fn hc_last_error_code() -> *const c_char {
    LAST_ERROR_CODE.with(|c| match &*c.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

// ============================================================================
// Version Information
// ============================================================================

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn hc_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    unsafe fn take(ptr: *mut c_char) -> Value {
        assert!(!ptr.is_null());
        let value = serde_json::from_str(CStr::from_ptr(ptr).to_str().unwrap()).unwrap();
        hc_free_string(ptr);
        value
    }

    unsafe fn last_code() -> String {
        let code = hc_last_error_code();
        assert!(!code.is_null());
        CStr::from_ptr(code).to_str().unwrap().to_string()
    }

    fn week_options() -> CString {
        CString::new(
            r#"{"timeRangeFilter": {
                "operator": "between",
                "startTime": "2024-03-01T00:00:00Z",
                "endTime": "2024-03-08T00:00:00Z"
            }}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_ffi_bucket_records_manual() {
        let record_type = CString::new("BodyTemperature").unwrap();
        let records = CString::new(
            r#"[
                {"time": "2024-03-01T07:00:00Z", "temperature": {"value": 36.5, "unit": "celsius"}},
                {"time": "2024-03-01T19:00:00Z", "temperature": {"value": 37.0, "unit": "celsius"}}
            ]"#,
        )
        .unwrap();
        let options = week_options();

        unsafe {
            let result = take(hc_bucket_records(
                record_type.as_ptr(),
                records.as_ptr(),
                options.as_ptr(),
                0,
            ));
            assert_eq!(result[0]["dateKey"], "20240301");
            assert_eq!(result[0]["entry"]["value"], "36.75");
            assert!(hc_last_error().is_null());
        }
    }

    #[test]
    fn test_ffi_bucket_records_offset_moves_day() {
        let record_type = CString::new("Steps").unwrap();
        let records = CString::new(
            r#"[{"startTime": "2024-03-01T02:00:00Z", "endTime": "2024-03-01T02:30:00Z", "count": 500}]"#,
        )
        .unwrap();
        let options = CString::new(
            r#"{"timeRangeFilter": {
                "operator": "between",
                "startTime": "2024-02-29T05:00:00Z",
                "endTime": "2024-03-02T05:00:00Z"
            }}"#,
        )
        .unwrap();

        unsafe {
            let result = take(hc_bucket_records(
                record_type.as_ptr(),
                records.as_ptr(),
                options.as_ptr(),
                -5 * 3600,
            ));
            assert_eq!(result.as_array().unwrap().len(), 1);
            assert_eq!(result[0]["dateKey"], "20240229");
            assert_eq!(result[0]["entry"]["value"], "500");
        }
    }

    #[test]
    fn test_ffi_error_codes() {
        let record_type = CString::new("Hydration").unwrap();
        let records = CString::new("[]").unwrap();

        unsafe {
            let result =
                hc_bucket_records(record_type.as_ptr(), records.as_ptr(), ptr::null(), 0);
            assert!(result.is_null());
            assert_eq!(last_code(), "INVALID_RECORD_TYPE");

            let bad_json = CString::new("not json").unwrap();
            let result =
                hc_bucket_records(record_type.as_ptr(), bad_json.as_ptr(), ptr::null(), 0);
            assert!(result.is_null());
            assert_eq!(last_code(), "ARGUMENT_VALIDATION_ERROR");

            let message = CStr::from_ptr(hc_last_error()).to_str().unwrap();
            assert!(!message.is_empty());
        }
    }

    #[test]
    fn test_ffi_expand_quantity() {
        let kind = CString::new("mass").unwrap();
        let quantity = CString::new(r#"{"value": 2, "unit": "kilograms"}"#).unwrap();

        unsafe {
            let result = take(hc_expand_quantity(kind.as_ptr(), quantity.as_ptr()));
            assert_eq!(result["inGrams"], 2000.0);

            let null = CString::new("null").unwrap();
            assert!(hc_expand_quantity(kind.as_ptr(), null.as_ptr()).is_null());
            assert_eq!(last_code(), "INVALID_MASS");
        }
    }

    #[test]
    fn test_ffi_record_types() {
        unsafe {
            let types = take(hc_record_types());
            let types = types.as_array().unwrap();
            assert_eq!(types.len(), 8);
            assert!(types.contains(&json!({
                "recordType": "SleepSession",
                "resultType": "SLEEP",
                "bucketing": "manual"
            })));
        }
    }

    #[test]
    fn test_ffi_bridge_lifecycle() {
        unsafe {
            let handle = hc_bridge_new(0);
            assert!(!handle.is_null());

            let records = CString::new(
                r#"[{"recordType": "Steps", "startTime": "2024-03-02T08:00:00Z",
                     "endTime": "2024-03-02T09:00:00Z", "count": 321}]"#,
            )
            .unwrap();
            let ids = take(hc_bridge_insert_records(handle, records.as_ptr()));
            assert_eq!(ids.as_array().unwrap().len(), 1);

            let steps = CString::new("Steps").unwrap();
            let options = week_options();
            let page = take(hc_bridge_read_records(handle, steps.as_ptr(), options.as_ptr()));
            assert_eq!(page["records"][0]["count"], 321.0);

            let aggregate = CString::new(
                r#"{"recordType": "Steps", "timeRangeFilter": {
                    "operator": "after", "startTime": "2024-03-01T00:00:00Z"}}"#,
            )
            .unwrap();
            let total = take(hc_bridge_aggregate(handle, aggregate.as_ptr()));
            assert_eq!(total["COUNT_TOTAL"], 321.0);

            let buckets = take(hc_bridge_read_bucketed(handle, steps.as_ptr(), options.as_ptr()));
            assert_eq!(buckets[0]["dateKey"], "20240302");

            let changes = take(hc_bridge_get_changes(handle, ptr::null()));
            assert_eq!(changes["hasMore"], false);

            hc_bridge_free(handle);
        }
    }

    #[test]
    fn test_ffi_null_handle_and_bad_offset() {
        unsafe {
            assert!(hc_bridge_get_changes(ptr::null(), ptr::null()).is_null());
            assert_eq!(last_code(), "ARGUMENT_VALIDATION_ERROR");

            assert!(hc_bridge_new(90_000).is_null());
            assert_eq!(last_code(), "ARGUMENT_VALIDATION_ERROR");
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = hc_version();
            assert!(!version.is_null());
            assert!(!CStr::from_ptr(version).to_str().unwrap().is_empty());
        }
    }
}
