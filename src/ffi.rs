//! FFI interface for C/C++ callers
//!
//! The schema crosses the boundary as a JSON [`SchemaDef`]; the record comes
//! back as the JSON of its `dict()`.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use tracing::debug;

use crate::definition::SchemaDef;
use crate::error::Result;

/// Result struct returned to the caller.
/// Both pointers are owned by Rust and must be freed via free_extraction_result
#[repr(C)]
pub struct ExtractionResultFFI {
    /// JSON-serialized record (null-terminated)
    pub json_ptr: *mut c_char,
    /// Error message if extraction failed (null-terminated), or null on success
    pub error_ptr: *mut c_char,
}

/// Build the schema described by `schema_json` and materialize one record
/// from `raw`, returned as JSON.
pub fn materialize_json(raw: &str, schema_json: &str) -> Result<String> {
    let schema = SchemaDef::from_json(schema_json)?.build()?;
    let record = schema.parse(raw)?;
    debug!("ffi: materialized `{}`", record.name());
    Ok(record.dict().to_string())
}

/// Materialize a record from markup according to a schema definition.
///
/// # Arguments
/// * `html_ptr` - Pointer to the input (UTF-8, not necessarily null-terminated)
/// * `html_len` - Length of the input in bytes
/// * `schema_json` - JSON-serialized SchemaDef (null-terminated)
///
/// # Returns
/// ExtractionResultFFI with either json_ptr set (success) or error_ptr set (failure)
///
/// # Safety
/// - `html_ptr` must point to valid memory of at least `html_len` bytes
/// - `schema_json` must be a valid null-terminated C string
/// - Caller must free the result via `free_extraction_result`
#[no_mangle]
pub unsafe extern "C" fn extract_record(
    html_ptr: *const c_char,
    html_len: usize,
    schema_json: *const c_char,
) -> ExtractionResultFFI {
    let html = if html_ptr.is_null() || html_len == 0 {
        ""
    } else {
        let slice = std::slice::from_raw_parts(html_ptr as *const u8, html_len);
        match std::str::from_utf8(slice) {
            Ok(s) => s,
            Err(_) => return make_error_result("Invalid UTF-8 in input"),
        }
    };

    if schema_json.is_null() {
        return make_error_result("Schema JSON is null");
    }
    let schema_str = match CStr::from_ptr(schema_json).to_str() {
        Ok(s) => s,
        Err(_) => return make_error_result("Invalid UTF-8 in schema JSON"),
    };

    match materialize_json(html, schema_str) {
        Ok(json) => match CString::new(json) {
            Ok(cstr) => ExtractionResultFFI {
                json_ptr: cstr.into_raw(),
                error_ptr: ptr::null_mut(),
            },
            Err(_) => make_error_result("Result JSON contains null bytes"),
        },
        Err(e) => make_error_result(&e.to_string()),
    }
}

/// Free an ExtractionResultFFI returned by extract_record
///
/// # Safety
/// - `result` must have been returned by `extract_record`
/// - Must only be called once per result
#[no_mangle]
pub unsafe extern "C" fn free_extraction_result(result: ExtractionResultFFI) {
    if !result.json_ptr.is_null() {
        drop(CString::from_raw(result.json_ptr));
    }
    if !result.error_ptr.is_null() {
        drop(CString::from_raw(result.error_ptr));
    }
}

fn make_error_result(msg: &str) -> ExtractionResultFFI {
    let error_cstr = CString::new(msg.replace('\0', " ")).unwrap_or_default();
    ExtractionResultFFI {
        json_ptr: ptr::null_mut(),
        error_ptr: error_cstr.into_raw(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCHEMA: &str = r#"{
        "name": "Product",
        "fail_tolerance": 0,
        "fields": [
            {"name": "title", "source": "html",
             "steps": [{"op": "css", "query": "h1"}, {"op": "first"}, {"op": "text"}]},
            {"name": "price", "type": "float", "source": "html",
             "steps": [{"op": "css", "query": ".price"}, {"op": "first"}, {"op": "text"},
                       {"op": "strip", "chars": "$"}]}
        ]
    }"#;

    unsafe fn call(html: &str, schema: &str) -> (Option<String>, Option<String>) {
        let schema = CString::new(schema).unwrap();
        let result = extract_record(html.as_ptr() as *const c_char, html.len(), schema.as_ptr());
        let read = |p: *mut c_char| (!p.is_null()).then(|| CStr::from_ptr(p).to_string_lossy().into_owned());
        let out = (read(result.json_ptr), read(result.error_ptr));
        free_extraction_result(result);
        out
    }

    #[test]
    fn test_extract_record() {
        let html = r#"<h1>Widget</h1><span class="price">$19.99</span>"#;
        let (json_out, error) = unsafe { call(html, SCHEMA) };
        assert!(error.is_none());
        let value: serde_json::Value = serde_json::from_str(&json_out.unwrap()).unwrap();
        assert_eq!(value, json!({"title": "Widget", "price": 19.99}));
    }

    #[test]
    fn test_extract_record_errors() {
        let (json_out, error) = unsafe { call("<p>no title</p>", SCHEMA) };
        assert!(json_out.is_none());
        assert_eq!(error.unwrap(), "`Product`: 1 of 2 fields failed parse");

        let (_, error) = unsafe { call("<p></p>", "{not json") };
        assert!(error.unwrap().starts_with("invalid schema definition"));

        let result = unsafe { extract_record(ptr::null(), 0, ptr::null()) };
        assert!(result.json_ptr.is_null());
        assert!(!result.error_ptr.is_null());
        unsafe { free_extraction_result(result) };
    }

    #[test]
    fn test_materialize_json() {
        let out = materialize_json("<h1>A</h1><i class=price>2</i>", SCHEMA).unwrap();
        assert_eq!(out, r#"{"title":"A","price":2.0}"#);
    }
}
