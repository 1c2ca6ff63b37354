//! LMDB-backed [`LocalStore`].
//!
//! Each catalog entry is stored under its big-endian `id` as a JSON [`StoredRecord`].
//! The record carries an insertion sequence number so listings come back in insertion
//! order even though LMDB itself iterates in key order.
//!
//! All LMDB calls are blocking; the async trait methods move them onto tokio's blocking
//! pool.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lmdb::{Cursor, Database, DatabaseFlags, Environment, Transaction, WriteFlags};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::catalog_item::CatalogItem;
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};
use crate::local_store::{ListKind, LocalStore};

/// Default LMDB map size (10 MiB).
pub const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024;

/// On-disk envelope of a catalog entry.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRecord {
    seq: u64,
    item: CatalogItem,
}

struct LmdbInner {
    env: Environment,
    db: Database,
    dir: PathBuf,
    next_seq: AtomicU64,
    closed: AtomicBool,
}

/// Persistent catalog store on top of an LMDB environment.
///
/// Cloning is cheap; clones share the same environment.
///
/// # Examples
///
/// ```no_run
/// use movie_catalog_core::lmdb_store::{LmdbCatalogStore, DEFAULT_MAP_SIZE};
///
/// let store = LmdbCatalogStore::open("movies", DEFAULT_MAP_SIZE)?;
/// println!("opened {}", store.dir().display());
/// # Ok::<(), movie_catalog_core::error::CatalogError>(())
/// ```
#[derive(Clone)]
pub struct LmdbCatalogStore {
    inner: Arc<LmdbInner>,
}

impl LmdbCatalogStore {
    /// Opens (or creates) the store at `<name>.lmdb/`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Storage`] if the directory cannot be created, the
    /// environment cannot be opened. Undecodable records are logged and skipped.
    pub fn open(name: impl AsRef<Path>, map_size: usize) -> Result<Self> {
        let dir = PathBuf::from(format!("{}.lmdb", name.as_ref().display()));

        if dir.exists() {
            info!("Opening existing catalog store at: {}", dir.display());
        } else {
            info!("Creating new catalog store at: {}", dir.display());
            std::fs::create_dir_all(&dir)?;
        }

        let env = Environment::new().set_map_size(map_size).open(&dir)?;
        let db = env.create_db(None, DatabaseFlags::empty())?;

        let inner = LmdbInner {
            env,
            db,
            dir,
            next_seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        };

        // Corrupt records must not keep the store from opening; `put` can still repair them.
        let records = inner.read_records(false)?;
        let next_seq = records.iter().map(|record| record.seq + 1).max().unwrap_or(0);
        inner.next_seq.store(next_seq, Ordering::SeqCst);

        info!(
            "Catalog store ready with {} records at: {}",
            records.len(),
            inner.dir.display()
        );

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn open_with_config(config: &CatalogConfig) -> Result<Self> {
        Self::open(&config.store_path, config.map_size_bytes)
    }

    /// Directory holding the LMDB files.
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Marks the store closed. Later operations fail with a storage error; the
    /// environment itself is released when the last clone is dropped.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            warn!("Catalog store already closed: {}", self.inner.dir.display());
            return Ok(());
        }
        self.inner.env.sync(true)?;
        info!("Catalog store closed: {}", self.inner.dir.display());
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Blocking variants, used by the FFI layer which has no runtime.
    pub fn put_blocking(&self, item: CatalogItem) -> Result<()> {
        self.inner.put(item)
    }

    pub fn remove_blocking(&self, id: i64) -> Result<bool> {
        self.inner.remove(id)
    }

    pub fn get_blocking(&self, id: i64) -> Result<Option<CatalogItem>> {
        self.inner.get(id)
    }

    pub fn list_blocking(&self, kind: ListKind) -> Result<Vec<CatalogItem>> {
        self.inner.list(kind)
    }

    async fn run_blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&LmdbInner) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner)).await?
    }
}

impl LmdbInner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CatalogError::Storage("store is closed".to_string()));
        }
        Ok(())
    }

    fn put(&self, item: CatalogItem) -> Result<()> {
        self.ensure_open()?;
        item.validate()?;

        let key = item.id.to_be_bytes();
        let mut txn = self.env.begin_rw_txn()?;

        let existing_seq = match txn.get(self.db, &key) {
            Ok(bytes) => match serde_json::from_slice::<StoredRecord>(bytes) {
                Ok(record) => Some(record.seq),
                Err(e) => {
                    warn!("Overwriting corrupt catalog record {}: {e}", item.id);
                    None
                }
            },
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        let seq = existing_seq.unwrap_or_else(|| self.next_seq.fetch_add(1, Ordering::SeqCst));

        let id = item.id;
        let json = serde_json::to_vec(&StoredRecord { seq, item })?;
        txn.put(self.db, &key, &json, WriteFlags::empty())?;
        txn.commit()?;

        debug!("Stored catalog item {id} (seq {seq}, replaced: {})", existing_seq.is_some());
        Ok(())
    }

    fn remove(&self, id: i64) -> Result<bool> {
        self.ensure_open()?;

        let mut txn = self.env.begin_rw_txn()?;
        match txn.del(self.db, &id.to_be_bytes(), None) {
            Ok(()) => {
                txn.commit()?;
                debug!("Removed catalog item {id}");
                Ok(true)
            }
            Err(lmdb::Error::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn get(&self, id: i64) -> Result<Option<CatalogItem>> {
        self.ensure_open()?;

        let txn = self.env.begin_ro_txn()?;
        let found = match txn.get(self.db, &id.to_be_bytes()) {
            Ok(bytes) => Some(serde_json::from_slice::<StoredRecord>(bytes)?.item),
            Err(lmdb::Error::NotFound) => None,
            Err(e) => return Err(e.into()),
        };
        Ok(found)
    }

    fn list(&self, kind: ListKind) -> Result<Vec<CatalogItem>> {
        self.ensure_open()?;

        let mut records = self.read_records(true)?;
        records.sort_by_key(|record| record.seq);
        Ok(records
            .into_iter()
            .map(|record| record.item)
            .filter(|item| kind.matches(item))
            .collect())
    }

    fn clear(&self) -> Result<()> {
        self.ensure_open()?;

        let mut txn = self.env.begin_rw_txn()?;
        let keys: Vec<Vec<u8>> = {
            let mut cursor = txn.open_ro_cursor(self.db)?;
            cursor.iter().map(|(key, _)| key.to_vec()).collect()
        };
        for key in &keys {
            txn.del(self.db, key, None)?;
        }
        txn.commit()?;

        info!("Cleared {} catalog records", keys.len());
        Ok(())
    }

    /// Decodes every record. `strict` turns a corrupt record into an error, otherwise
    /// it is logged and skipped.
    ///
    /// `Cursor::iter` starts from an unpositioned cursor and yields nothing on an
    /// empty database.
    fn read_records(&self, strict: bool) -> Result<Vec<StoredRecord>> {
        let txn = self.env.begin_ro_txn()?;
        let mut cursor = txn.open_ro_cursor(self.db)?;

        let mut records = Vec::new();
        for (key, value) in cursor.iter() {
            match serde_json::from_slice::<StoredRecord>(value) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Corrupt catalog record under key {key:?}: {e}");
                    if strict {
                        return Err(e.into());
                    }
                }
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl LocalStore for LmdbCatalogStore {
    async fn put(&self, item: CatalogItem) -> Result<()> {
        self.run_blocking(move |inner| inner.put(item)).await
    }

    async fn remove(&self, id: i64) -> Result<bool> {
        self.run_blocking(move |inner| inner.remove(id)).await
    }

    async fn get(&self, id: i64) -> Result<Option<CatalogItem>> {
        self.run_blocking(move |inner| inner.get(id)).await
    }

    async fn list(&self, kind: ListKind) -> Result<Vec<CatalogItem>> {
        self.run_blocking(move |inner| inner.list(kind)).await
    }

    async fn clear(&self) -> Result<()> {
        self.run_blocking(|inner| inner.clear()).await
    }
}
