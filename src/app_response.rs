use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// JSON envelope returned by every C-ABI function.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum AppResponse {
    StorageError(String),
    SerializationError(String),
    NotFound(String),
    ValidationError(String),
    BadRequest(String),
    Ok(String),
}

impl Display for AppResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppResponse::StorageError(msg) => write!(f, "Storage error: {}", msg),
            AppResponse::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppResponse::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppResponse::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppResponse::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppResponse::Ok(msg) => write!(f, "Ok: {}", msg),
        }
    }
}

impl From<CatalogError> for AppResponse {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Storage(msg) => AppResponse::StorageError(msg),
            CatalogError::InvalidItem(msg) => AppResponse::ValidationError(msg),
            CatalogError::InvalidPage(page) => {
                AppResponse::ValidationError(format!("Invalid page {page}"))
            }
            CatalogError::Config(msg) => AppResponse::BadRequest(msg),
            other => AppResponse::BadRequest(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppResponse {
    fn from(err: serde_json::Error) -> Self {
        AppResponse::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl AppResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        AppResponse::Ok(msg.into())
    }

    /// Serializes `value` into an `Ok` payload.
    pub fn ok_json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(json) => AppResponse::Ok(json),
            Err(e) => AppResponse::from(e),
        }
    }
}
