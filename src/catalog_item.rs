//! Data model definitions for catalog entries.
//!
//! This module defines [`CatalogItem`], the single value type that flows between the
//! remote source, the local store and the engine. Identity is the numeric `id` assigned
//! by the remote service; every other field may change between fetches.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// One movie entry of the catalog.
///
/// # Structure
///
/// - **id**: Stable identifier assigned by the remote source, used as the store key
/// - **title**: Display title (the remote `original_title` key is accepted as well)
/// - **backdrop_path** / **poster_path**: Optional image paths, never resolved here
/// - **vote_average** / **vote_count**: Rating data used by filters
/// - **is_favorite** / **is_saved**: Local-only flags, never part of a remote payload
///
/// # Examples
///
/// ```rust
/// use movie_catalog_core::catalog_item::CatalogItem;
///
/// let item = CatalogItem::new(550, "Fight Club").with_votes(8.4, 27_000);
/// assert!(!item.is_favorite);
/// assert!(item.same_entry(&CatalogItem::new(550, "Fight Club (1999)")));
/// ```
///
/// # Identity
///
/// Two items with the same `id` are the same catalog entry regardless of any other
/// field. [`PartialEq`] still compares all fields; use [`CatalogItem::same_entry`] when
/// identity is what matters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CatalogItem {
    /// Identifier assigned by the remote service. Immutable and unique.
    pub id: i64,

    #[serde(alias = "original_title")]
    pub title: String,

    #[serde(default)]
    pub backdrop_path: Option<String>,

    #[serde(default)]
    pub poster_path: Option<String>,

    #[serde(default)]
    pub vote_average: f64,

    #[serde(default)]
    pub vote_count: u64,

    /// Set only through explicit local mutation.
    #[serde(default)]
    pub is_favorite: bool,

    /// Set only through explicit local mutation.
    #[serde(default)]
    pub is_saved: bool,
}

impl CatalogItem {
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            backdrop_path: None,
            poster_path: None,
            vote_average: 0.0,
            vote_count: 0,
            is_favorite: false,
            is_saved: false,
        }
    }

    pub fn with_votes(mut self, vote_average: f64, vote_count: u64) -> Self {
        self.vote_average = vote_average;
        self.vote_count = vote_count;
        self
    }

    pub fn with_images(mut self, backdrop_path: Option<String>, poster_path: Option<String>) -> Self {
        self.backdrop_path = backdrop_path;
        self.poster_path = poster_path;
        self
    }

    /// Whether `other` is the same catalog entry (same `id`).
    pub fn same_entry(&self, other: &CatalogItem) -> bool {
        self.id == other.id
    }

    /// Whether the item carries any local flag worth persisting.
    pub fn is_persistable(&self) -> bool {
        self.is_favorite || self.is_saved
    }

    /// Copies the local-only flags of `local` onto this item.
    pub fn adopt_local_flags(&mut self, local: &CatalogItem) {
        self.is_favorite = local.is_favorite;
        self.is_saved = local.is_saved;
    }

    /// Checks the invariants of a storable item.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::InvalidItem`] when the id is not positive or the vote
    /// average is negative or not a number.
    pub fn validate(&self) -> Result<()> {
        if self.id <= 0 {
            return Err(CatalogError::InvalidItem(format!(
                "id must be positive, got {}",
                self.id
            )));
        }
        if self.vote_average.is_nan() || self.vote_average < 0.0 {
            return Err(CatalogError::InvalidItem(format!(
                "vote_average must be >= 0, got {} for id {}",
                self.vote_average, self.id
            )));
        }
        Ok(())
    }
}

/// Collapses entries sharing an `id`.
///
/// The first occurrence keeps its position so the upstream order is preserved, while
/// the field values of the last occurrence win (the most recently fetched copy).
pub fn dedupe_by_id(items: Vec<CatalogItem>) -> Vec<CatalogItem> {
    let mut positions: HashMap<i64, usize> = HashMap::with_capacity(items.len());
    let mut unique: Vec<CatalogItem> = Vec::with_capacity(items.len());

    for item in items {
        match positions.get(&item.id) {
            Some(&index) => unique[index] = item,
            None => {
                positions.insert(item.id, unique.len());
                unique.push(item);
            }
        }
    }

    unique
}
