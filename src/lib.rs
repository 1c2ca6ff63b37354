//! # Movie Catalog Core
//!
//! A paginated, cache-backed movie catalog engine for mobile and desktop front ends.
//! It reconciles a remote paged source with a local LMDB store and exposes one
//! consistent, observable view to the UI layer.
//!
//! ## Features
//!
//! - **Paged remote loading**: next/previous navigation with a floor at page 1
//! - **Offline favorites and saved lists**: persisted in LMDB, read without network
//! - **Client-side filtering**: non-destructive predicates over the working list
//! - **Last-request-wins delivery**: stale responses never overwrite newer results
//! - **Native embedding**: C-compatible functions over the local store
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use movie_catalog_core::{CatalogConfig, CatalogEngine, HttpRemoteSource, LmdbCatalogStore};
//!
//! # async fn run() -> Result<(), movie_catalog_core::CatalogError> {
//! let config = CatalogConfig::default().with_env_overrides();
//! let engine = CatalogEngine::new(
//!     Arc::new(HttpRemoteSource::from_config(&config)?),
//!     Arc::new(LmdbCatalogStore::open_with_config(&config)?),
//! );
//!
//! let mut view = engine.subscribe();
//! engine.load_page(1).await?;
//! if let Some(state) = view.wait_terminal().await {
//!     println!("{state:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## FFI Functions
//!
//! - [`catalog_store_open`] - Open or create a store
//! - [`catalog_store_put`] - Insert or replace an item
//! - [`catalog_store_get`] - Retrieve an item by id
//! - [`catalog_store_remove`] - Remove an item by id
//! - [`catalog_store_list`] - List all, favorite or saved items
//! - [`catalog_store_close`] - Close and release a store
//! - [`catalog_string_free`] - Free a string returned by this library

pub mod app_response;
pub mod catalog_engine;
pub mod catalog_item;
pub mod config;
pub mod error;
pub mod filter;
pub mod lmdb_store;
pub mod local_store;
pub mod remote_source;
pub mod result_state;

pub use crate::catalog_engine::{ActiveQuery, CatalogEngine};
pub use crate::catalog_item::CatalogItem;
pub use crate::config::CatalogConfig;
pub use crate::error::CatalogError;
pub use crate::filter::FilterPredicate;
pub use crate::lmdb_store::LmdbCatalogStore;
pub use crate::local_store::{ListKind, LocalStore, MemoryCatalogStore};
pub use crate::remote_source::{HttpRemoteSource, RemoteSource};
pub use crate::result_state::{ResultChannel, ResultState, ResultSubscription};

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};

use crate::app_response::AppResponse;
use crate::lmdb_store::DEFAULT_MAP_SIZE;

/// Opens (or creates) a catalog store named `name` (`<name>.lmdb` on disk).
///
/// # Returns
///
/// A pointer to the store on success, or a null pointer on failure. Release it with
/// [`catalog_store_close`].
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use movie_catalog_core::catalog_store_open;
///
/// let name = CString::new("movies").unwrap();
/// let store = catalog_store_open(name.as_ptr());
/// assert!(!store.is_null());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn catalog_store_open(name: *const c_char) -> *mut LmdbCatalogStore {
    if name.is_null() {
        warn!("Null name pointer passed to catalog_store_open");
        return std::ptr::null_mut();
    }

    let name_str = match unsafe { CStr::from_ptr(name).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in name parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    match LmdbCatalogStore::open(name_str, DEFAULT_MAP_SIZE) {
        Ok(store) => {
            info!("Catalog store opened through FFI: {}", store.dir().display());
            Box::into_raw(Box::new(store))
        }
        Err(e) => {
            warn!("Failed to open catalog store {name_str}: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Inserts or replaces a catalog item given as JSON.
///
/// # JSON Format
///
/// ```json
/// { "id": 550, "title": "Fight Club", "vote_average": 8.4, "vote_count": 27000,
///   "is_favorite": true, "is_saved": false }
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn catalog_store_put(store: *mut LmdbCatalogStore, json_ptr: *const c_char) -> *const c_char {
    let store = match unsafe { store.as_ref() } {
        Some(s) => s,
        None => return response_to_c_string(&AppResponse::BadRequest("Null store pointer".to_string())),
    };

    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(err) => return err,
    };

    let item: CatalogItem = match serde_json::from_str(&json_str) {
        Ok(item) => item,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
            return response_to_c_string(&error);
        }
    };

    match store.put_blocking(item.clone()) {
        Ok(()) => response_to_c_string(&AppResponse::ok_json(&item)),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Retrieves an item by id. Answers `NotFound` when the id is unknown.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn catalog_store_get(store: *mut LmdbCatalogStore, id: i64) -> *const c_char {
    let store = match unsafe { store.as_ref() } {
        Some(s) => s,
        None => return response_to_c_string(&AppResponse::BadRequest("Null store pointer".to_string())),
    };

    match store.get_blocking(id) {
        Ok(Some(item)) => response_to_c_string(&AppResponse::ok_json(&item)),
        Ok(None) => response_to_c_string(&AppResponse::NotFound(format!("No catalog item with id: {id}"))),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Removes an item by id. Removing an unknown id still succeeds.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn catalog_store_remove(store: *mut LmdbCatalogStore, id: i64) -> *const c_char {
    let store = match unsafe { store.as_ref() } {
        Some(s) => s,
        None => return response_to_c_string(&AppResponse::BadRequest("Null store pointer".to_string())),
    };

    match store.remove_blocking(id) {
        Ok(true) => response_to_c_string(&AppResponse::success(format!("Removed catalog item {id}"))),
        Ok(false) => response_to_c_string(&AppResponse::success(format!("Catalog item {id} was not stored"))),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Lists items as a JSON array. `kind`: `0` all, `1` favorites, `2` saved.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn catalog_store_list(store: *mut LmdbCatalogStore, kind: i32) -> *const c_char {
    let store = match unsafe { store.as_ref() } {
        Some(s) => s,
        None => return response_to_c_string(&AppResponse::BadRequest("Null store pointer".to_string())),
    };

    let kind = match ListKind::try_from(kind) {
        Ok(kind) => kind,
        Err(e) => return response_to_c_string(&AppResponse::BadRequest(e.to_string())),
    };

    match store.list_blocking(kind) {
        Ok(items) => response_to_c_string(&AppResponse::ok_json(&items)),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Closes the store and releases the handle. The pointer must not be used afterwards.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn catalog_store_close(store: *mut LmdbCatalogStore) -> *const c_char {
    if store.is_null() {
        let error = AppResponse::BadRequest("Null store pointer passed to catalog_store_close".to_string());
        return response_to_c_string(&error);
    }

    let store = unsafe { Box::from_raw(store) };
    match store.close() {
        Ok(()) => response_to_c_string(&AppResponse::success("Catalog store closed successfully")),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Frees a string previously returned by one of the functions above.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn catalog_string_free(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(ptr) });
}

/// Serializes `response` into a caller-owned C string (null if that fails).
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a `String`, answering a ready-made error response
/// for null pointers and invalid UTF-8.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
