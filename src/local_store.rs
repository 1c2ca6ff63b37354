//! The persisted side of the catalog.
//!
//! [`LocalStore`] is the contract the engine depends on. Two implementations ship with
//! the crate: [`LmdbCatalogStore`](crate::lmdb_store::LmdbCatalogStore) for on-disk
//! persistence and [`MemoryCatalogStore`] for embedders that keep everything in memory.
//!
//! All listings are returned in insertion order. Replacing an existing id keeps its
//! original position.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::catalog_item::CatalogItem;
use crate::error::{CatalogError, Result};

/// Which view of the store to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    All,
    Favorites,
    Saved,
}

impl ListKind {
    pub fn matches(self, item: &CatalogItem) -> bool {
        match self {
            ListKind::All => true,
            ListKind::Favorites => item.is_favorite,
            ListKind::Saved => item.is_saved,
        }
    }
}

impl TryFrom<i32> for ListKind {
    type Error = CatalogError;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(ListKind::All),
            1 => Ok(ListKind::Favorites),
            2 => Ok(ListKind::Saved),
            other => Err(CatalogError::InvalidItem(format!("unknown list kind {other}"))),
        }
    }
}

/// Keyed collection of [`CatalogItem`]s.
///
/// Storage problems surface as [`CatalogError::Storage`]; implementations never panic.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Inserts or replaces the item with the same id.
    async fn put(&self, item: CatalogItem) -> Result<()>;

    /// Removes an item. Removing an unknown id is not an error; returns whether
    /// something was removed.
    async fn remove(&self, id: i64) -> Result<bool>;

    async fn get(&self, id: i64) -> Result<Option<CatalogItem>>;

    /// Lists the items matching `kind`, in insertion order.
    async fn list(&self, kind: ListKind) -> Result<Vec<CatalogItem>>;

    /// Removes every item.
    async fn clear(&self) -> Result<()>;

    async fn list_all(&self) -> Result<Vec<CatalogItem>> {
        self.list(ListKind::All).await
    }

    async fn list_favorites(&self) -> Result<Vec<CatalogItem>> {
        self.list(ListKind::Favorites).await
    }

    async fn list_saved(&self) -> Result<Vec<CatalogItem>> {
        self.list(ListKind::Saved).await
    }
}

/// In-memory [`LocalStore`].
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    items: Mutex<Vec<CatalogItem>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<CatalogItem>>> {
        self.items
            .lock()
            .map_err(|_| CatalogError::Storage("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl LocalStore for MemoryCatalogStore {
    async fn put(&self, item: CatalogItem) -> Result<()> {
        item.validate()?;
        let mut items = self.lock()?;
        match items.iter_mut().find(|existing| existing.same_entry(&item)) {
            Some(existing) => *existing = item,
            None => items.push(item),
        }
        Ok(())
    }

    async fn remove(&self, id: i64) -> Result<bool> {
        let mut items = self.lock()?;
        let before = items.len();
        items.retain(|item| item.id != id);
        Ok(items.len() != before)
    }

    async fn get(&self, id: i64) -> Result<Option<CatalogItem>> {
        let items = self.lock()?;
        Ok(items.iter().find(|item| item.id == id).cloned())
    }

    async fn list(&self, kind: ListKind) -> Result<Vec<CatalogItem>> {
        let items = self.lock()?;
        Ok(items.iter().filter(|item| kind.matches(item)).cloned().collect())
    }

    async fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}
