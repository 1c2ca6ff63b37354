//! Error types shared by the store, the remote source and the engine.
//!
//! [`CatalogError`] is `Clone` and `PartialEq` so it can travel inside a
//! [`ResultState`](crate::result_state::ResultState) and be compared in tests.
//! Underlying library errors are flattened into their message at the boundary.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Transport failure: no usable response was received.
    #[error("Network error: {0}")]
    Network(String),

    /// The remote answered with a non-success status.
    #[error("Server error: status {status}")]
    Server { status: u16 },

    /// The local store is unavailable or holds a corrupt record.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid page: {0} (pages start at 1)")]
    InvalidPage(u32),

    #[error("Invalid catalog item: {0}")]
    InvalidItem(String),

    /// `previous_page` was requested while already on the first page.
    #[error("Already on the first page")]
    AtFirstPage,

    /// The operation needs a successfully delivered list and there is none.
    #[error("No successful result to operate on")]
    NotReady,

    /// A newer request was issued before this one completed; its response was dropped.
    #[error("Request superseded by a newer one")]
    Superseded,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<lmdb::Error> for CatalogError {
    fn from(err: lmdb::Error) -> Self {
        match err {
            lmdb::Error::Corrupted => CatalogError::Storage("Database is corrupted".to_string()),
            lmdb::Error::MapFull => CatalogError::Storage("Database map is full".to_string()),
            other => CatalogError::Storage(format!("LMDB error: {other}")),
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Storage(format!("Corrupt record: {err}"))
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Storage(format!("IO error: {err}"))
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if !status.is_success() => CatalogError::Server {
                status: status.as_u16(),
            },
            _ => CatalogError::Network(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for CatalogError {
    fn from(err: tokio::task::JoinError) -> Self {
        CatalogError::Storage(format!("Store task failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
