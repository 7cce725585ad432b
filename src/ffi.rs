//! FFI interface for C/C++ hosts
//!
//! A host fetches the page itself and hands the body over together with a
//! JSON request describing the scraper. Everything coming back is JSON.

use std::ffi::{c_char, CStr, CString};
use std::ptr;

use serde::{Deserialize, Serialize};

use crate::builder::RecordBuilder;
use crate::config::ScraperConfig;
use crate::crawl::HttpFetcher;
use crate::date_filter::{DateFilter, Verdict};
use crate::normalize::TagNormalizer;
use crate::records::{Overrides, Record, RecordKind};
use crate::response::Response;
use crate::selector_map::CompiledSelectorMap;

/// Result struct returned to the host
/// Both pointers are owned by Rust and must be freed via tpdb_free_result
#[repr(C)]
pub struct BuildResultFFI {
    /// JSON-serialized `BuildOutcome` (null-terminated)
    pub json_ptr: *mut c_char,
    /// Error message if the build failed (null-terminated), or null on success
    pub error_ptr: *mut c_char,
}

/// JSON request accepted by `tpdb_build_record`
#[derive(Debug, Deserialize)]
pub struct BuildRequest {
    /// Final URL of the fetched page
    pub url: String,
    pub kind: RecordKind,
    pub config: ScraperConfig,
    #[serde(default)]
    pub overrides: Overrides,
    /// Fetch image blobs over HTTP while building
    #[serde(default)]
    pub fetch_images: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Accepted,
    /// Debug mode: shown, never submitted
    Inspect,
    /// Dropped by the date filter
    Rejected,
}

#[derive(Debug, Serialize)]
pub struct BuildOutcome {
    pub status: BuildStatus,
    pub record: Record,
}

/// Build one record from a fetched page.
///
/// # Arguments
/// * `body_ptr` - Pointer to the page body (UTF-8, not necessarily null-terminated)
/// * `body_len` - Length of the body in bytes
/// * `request_json` - JSON-serialized BuildRequest (null-terminated)
///
/// # Safety
/// - `body_ptr` must point to valid memory of at least `body_len` bytes
/// - `request_json` must be a valid null-terminated C string
/// - Caller must free the result via `tpdb_free_result`
#[no_mangle]
pub unsafe extern "C" fn tpdb_build_record(
    body_ptr: *const c_char,
    body_len: usize,
    request_json: *const c_char,
) -> BuildResultFFI {
    let body = if body_ptr.is_null() || body_len == 0 {
        String::new()
    } else {
        let slice = std::slice::from_raw_parts(body_ptr as *const u8, body_len);
        match std::str::from_utf8(slice) {
            Ok(s) => s.to_string(),
            Err(_) => return make_error_result("Invalid UTF-8 in page body"),
        }
    };

    if request_json.is_null() {
        return make_error_result("Request JSON is null");
    }
    let request_str = match CStr::from_ptr(request_json).to_str() {
        Ok(s) => s,
        Err(_) => return make_error_result("Invalid UTF-8 in request JSON"),
    };

    let request: BuildRequest = match serde_json::from_str(request_str) {
        Ok(r) => r,
        Err(e) => return make_error_result(&format!("Failed to parse request JSON: {}", e)),
    };

    match build_outcome(&body, &request).and_then(|outcome| {
        serde_json::to_string(&outcome).map_err(|e| format!("Failed to serialize result: {}", e))
    }) {
        Ok(json) => match CString::new(json) {
            Ok(cstr) => BuildResultFFI {
                json_ptr: cstr.into_raw(),
                error_ptr: ptr::null_mut(),
            },
            Err(_) => make_error_result("Result JSON contains null bytes"),
        },
        Err(msg) => make_error_result(&msg),
    }
}

/// Free a BuildResultFFI returned by tpdb_build_record
///
/// # Safety
/// - `result` must have been returned by `tpdb_build_record`
/// - Must only be called once per result
#[no_mangle]
pub unsafe extern "C" fn tpdb_free_result(result: BuildResultFFI) {
    if !result.json_ptr.is_null() {
        drop(CString::from_raw(result.json_ptr));
    }
    if !result.error_ptr.is_null() {
        drop(CString::from_raw(result.error_ptr));
    }
}

/// Install `env_logger` (honours `RUST_LOG`). Safe to call more than once.
#[no_mangle]
pub extern "C" fn tpdb_init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

// Helper to create error result
fn make_error_result(msg: &str) -> BuildResultFFI {
    let error_cstr = CString::new(msg.replace('\0', " ")).unwrap_or_default();
    BuildResultFFI {
        json_ptr: ptr::null_mut(),
        error_ptr: error_cstr.into_raw(),
    }
}

fn build_outcome(body: &str, request: &BuildRequest) -> Result<BuildOutcome, String> {
    let config = &request.config;
    let raw_map = config
        .selector_map
        .as_ref()
        .ok_or_else(|| crate::error::ConfigError::MissingSelectorMap.to_string())?;
    let map = CompiledSelectorMap::compile(raw_map).map_err(|e| e.to_string())?;
    let tags = TagNormalizer::new(&config.tag_aliases);

    let fetcher = if request.fetch_images {
        Some(HttpFetcher::new(&config.settings).map_err(|e| e.to_string())?)
    } else {
        None
    };

    let mut builder = RecordBuilder::new(config, &map, &tags);
    if let Some(fetcher) = fetcher.as_ref() {
        builder = builder.with_image_fetcher(fetcher);
    }

    let response = Response::new(request.url.clone(), body);
    let record = builder
        .build(&response, request.kind, &request.overrides)
        .map_err(|e| e.to_string())?;

    let filter = DateFilter::new(config.settings.days);
    Ok(match filter.check(record, config.settings.debug) {
        Verdict::Accept(record) => BuildOutcome {
            status: BuildStatus::Accepted,
            record,
        },
        Verdict::Inspect(record) => BuildOutcome {
            status: BuildStatus::Inspect,
            record,
        },
        Verdict::Reject(record) => BuildOutcome {
            status: BuildStatus::Rejected,
            record,
        },
    })
}
