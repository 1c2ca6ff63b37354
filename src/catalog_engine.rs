//! The catalog engine: paging over the remote source, local favorite/saved views,
//! client-side filtering and the single result channel consumers observe.
//!
//! # Request ordering
//!
//! Every producing operation (`load_page`, `get_favorites`, `get_saved` and the
//! re-runs triggered by `apply_filter(.., false)`, `refresh` or a flag change in a
//! local view) takes a ticket from a monotonically increasing counter and publishes
//! `Loading`. When its I/O completes the result is applied only if the ticket is still
//! the newest one. Late responses of superseded requests are dropped and the call
//! returns [`CatalogError::Superseded`].
//!
//! Implicit re-runs (filter removal, flag changes in a local view) only start while the
//! channel holds `Success`. They never supersede a request still in flight.
//!
//! All state mutation happens under one mutex that is never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use crate::catalog_item::{dedupe_by_id, CatalogItem};
use crate::error::{CatalogError, Result};
use crate::filter::FilterPredicate;
use crate::local_store::{ListKind, LocalStore};
use crate::remote_source::{check_page, RemoteSource};
use crate::result_state::{ResultChannel, ResultState, ResultSubscription};

/// The query that produced the current working list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveQuery {
    Page(u32),
    Favorites,
    Saved,
}

struct EngineState {
    /// Page of the last successful remote load.
    page: u32,
    working_list: Vec<CatalogItem>,
    active_query: Option<ActiveQuery>,
    filter: Option<FilterPredicate>,
    latest_request: u64,
}

impl EngineState {
    fn displayed(&self) -> Vec<CatalogItem> {
        match &self.filter {
            Some(predicate) => predicate.apply(&self.working_list),
            None => self.working_list.clone(),
        }
    }
}

struct EngineInner {
    remote: Arc<dyn RemoteSource>,
    store: Arc<dyn LocalStore>,
    channel: ResultChannel<Vec<CatalogItem>>,
    state: Mutex<EngineState>,
}

/// Orchestrates the remote source and the local store behind one consistent view.
///
/// Clones share the same state and channel.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use movie_catalog_core::catalog_engine::CatalogEngine;
/// use movie_catalog_core::config::CatalogConfig;
/// use movie_catalog_core::lmdb_store::LmdbCatalogStore;
/// use movie_catalog_core::remote_source::HttpRemoteSource;
///
/// # async fn run() -> Result<(), movie_catalog_core::error::CatalogError> {
/// let config = CatalogConfig::default().with_env_overrides();
/// let engine = CatalogEngine::new(
///     Arc::new(HttpRemoteSource::from_config(&config)?),
///     Arc::new(LmdbCatalogStore::open_with_config(&config)?),
/// );
///
/// let mut view = engine.subscribe();
/// engine.load_page(1).await?;
/// engine.apply_filter(config.popular_filter(), true).await?;
/// println!("{:?}", view.current());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CatalogEngine {
    inner: Arc<EngineInner>,
}

impl CatalogEngine {
    pub fn new(remote: Arc<dyn RemoteSource>, store: Arc<dyn LocalStore>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                remote,
                store,
                channel: ResultChannel::new(),
                state: Mutex::new(EngineState {
                    page: 1,
                    working_list: Vec::new(),
                    active_query: None,
                    filter: None,
                    latest_request: 0,
                }),
            }),
        }
    }

    // ===============================
    // OBSERVATION
    // ===============================

    /// Attaches a consumer. It immediately sees the last published state.
    pub fn subscribe(&self) -> ResultSubscription<Vec<CatalogItem>> {
        self.inner.channel.subscribe()
    }

    pub fn state(&self) -> ResultState<Vec<CatalogItem>> {
        self.inner.channel.current()
    }

    pub fn page(&self) -> u32 {
        self.lock_state().page
    }

    pub fn can_go_back(&self) -> bool {
        self.page() > 1
    }

    pub fn active_query(&self) -> Option<ActiveQuery> {
        self.lock_state().active_query
    }

    pub fn is_filter_enabled(&self) -> bool {
        self.lock_state().filter.is_some()
    }

    /// The unfiltered list produced by the active query.
    pub fn working_list(&self) -> Vec<CatalogItem> {
        self.lock_state().working_list.clone()
    }

    // ===============================
    // REMOTE PAGES
    // ===============================

    /// Loads `page` from the remote source and makes it the working list.
    ///
    /// On failure the previous list, page and active query stay untouched and the
    /// error is published as `Failure`.
    pub async fn load_page(&self, page: u32) -> Result<Vec<CatalogItem>> {
        check_page(page)?;

        let ticket = self.begin_request();
        self.execute(ticket, ActiveQuery::Page(page)).await
    }

    pub async fn next_page(&self) -> Result<Vec<CatalogItem>> {
        let target = self.page().saturating_add(1);
        self.load_page(target).await
    }

    /// Loads the previous page. On page 1 nothing is fetched or published.
    pub async fn previous_page(&self) -> Result<Vec<CatalogItem>> {
        let current = self.page();
        if current <= 1 {
            debug!("previous_page ignored on first page");
            return Err(CatalogError::AtFirstPage);
        }
        self.load_page(current - 1).await
    }

    // ===============================
    // LOCAL VIEWS
    // ===============================

    pub async fn get_favorites(&self) -> Result<Vec<CatalogItem>> {
        self.run_query(ActiveQuery::Favorites).await
    }

    pub async fn get_saved(&self) -> Result<Vec<CatalogItem>> {
        self.run_query(ActiveQuery::Saved).await
    }

    // ===============================
    // FILTERING
    // ===============================

    /// Narrows the displayed list with `predicate`, or restores the unfiltered view.
    ///
    /// Enabling only works on a successfully delivered list; while a request is loading
    /// or after a failure it returns [`CatalogError::NotReady`] and publishes nothing.
    /// Disabling re-runs the query that produced the working list. It has the same
    /// `NotReady` guard, and when no filter is active it returns the current list
    /// without publishing or fetching anything.
    pub async fn apply_filter(
        &self,
        predicate: FilterPredicate,
        enabled: bool,
    ) -> Result<Vec<CatalogItem>> {
        if enabled {
            let mut state = self.lock_state();
            if !self.inner.channel.current().is_success() {
                debug!("Filter {} ignored: no successful list", predicate.name());
                return Err(CatalogError::NotReady);
            }

            let filtered = predicate.apply(&state.working_list);
            info!(
                "Filter {} kept {} of {} items",
                predicate.name(),
                filtered.len(),
                state.working_list.len()
            );
            state.filter = Some(predicate);
            // The channel holds `Success`, so no request is in flight to supersede.
            self.inner.channel.finish(ResultState::Success(filtered.clone()));
            return Ok(filtered);
        }

        let (ticket, query) = {
            let mut state = self.lock_state();
            if !self.inner.channel.current().is_success() {
                debug!("Filter {} removal ignored: no successful list", predicate.name());
                return Err(CatalogError::NotReady);
            }
            if state.filter.is_none() {
                return Ok(state.displayed());
            }
            let Some(query) = state.active_query else {
                return Err(CatalogError::NotReady);
            };
            state.filter = None;
            info!("Filter {} removed, re-running {query:?}", predicate.name());
            (Self::begin_locked(&self.inner.channel, &mut state), query)
        };
        self.execute(ticket, query).await
    }

    /// Re-runs the active query, or loads the first page if nothing ran yet.
    pub async fn refresh(&self) -> Result<Vec<CatalogItem>> {
        let query = self.active_query().unwrap_or(ActiveQuery::Page(1));
        self.run_query(query).await
    }

    async fn run_query(&self, query: ActiveQuery) -> Result<Vec<CatalogItem>> {
        if let ActiveQuery::Page(page) = query {
            check_page(page)?;
        }
        let ticket = self.begin_request();
        self.execute(ticket, query).await
    }

    /// Performs the I/O of request `ticket` and applies its outcome.
    async fn execute(&self, ticket: u64, query: ActiveQuery) -> Result<Vec<CatalogItem>> {
        let outcome = match query {
            ActiveQuery::Page(page) => {
                info!("Loading catalog page {page} (request {ticket})");
                match self.inner.remote.fetch_page(page).await {
                    Ok(items) => Ok(self.reconcile(dedupe_by_id(items)).await),
                    Err(e) => Err(e),
                }
            }
            ActiveQuery::Favorites => {
                info!("Loading local favorites view (request {ticket})");
                self.inner.store.list(ListKind::Favorites).await
            }
            ActiveQuery::Saved => {
                info!("Loading local saved view (request {ticket})");
                self.inner.store.list(ListKind::Saved).await
            }
        };
        self.complete(ticket, outcome, query)
    }

    // ===============================
    // LOCAL MUTATIONS
    // ===============================

    /// Marks or unmarks `item` as favorite in the store.
    ///
    /// Storage errors are returned to the caller and not published.
    pub async fn set_favorite(&self, item: CatalogItem, favorite: bool) -> Result<CatalogItem> {
        let mut item = self.with_stored_flags(item).await?;
        item.is_favorite = favorite;
        self.persist(item).await
    }

    pub async fn toggle_favorite(&self, id: i64) -> Result<CatalogItem> {
        let item = self.require_item(id).await?;
        let favorite = !item.is_favorite;
        self.set_favorite(item, favorite).await
    }

    pub async fn save_item(&self, item: CatalogItem) -> Result<CatalogItem> {
        let mut item = self.with_stored_flags(item).await?;
        item.is_saved = true;
        self.persist(item).await
    }

    pub async fn unsave_item(&self, id: i64) -> Result<CatalogItem> {
        let item = self.require_item(id).await?;
        let mut item = self.with_stored_flags(item).await?;
        item.is_saved = false;
        self.persist(item).await
    }

    /// Looks an item up in the working list, then in the store.
    pub async fn get_item(&self, id: i64) -> Result<Option<CatalogItem>> {
        let cached = self
            .lock_state()
            .working_list
            .iter()
            .find(|item| item.id == id)
            .cloned();
        match cached {
            Some(item) => Ok(Some(item)),
            None => self.inner.store.get(id).await,
        }
    }

    async fn require_item(&self, id: i64) -> Result<CatalogItem> {
        self.get_item(id)
            .await?
            .ok_or_else(|| CatalogError::InvalidItem(format!("unknown catalog item {id}")))
    }

    async fn with_stored_flags(&self, mut item: CatalogItem) -> Result<CatalogItem> {
        item.validate()?;
        match self.inner.store.get(item.id).await? {
            Some(stored) => item.adopt_local_flags(&stored),
            None => {
                item.is_favorite = false;
                item.is_saved = false;
            }
        }
        Ok(item)
    }

    async fn persist(&self, item: CatalogItem) -> Result<CatalogItem> {
        let result = if item.is_persistable() {
            self.inner.store.put(item.clone()).await
        } else {
            self.inner.store.remove(item.id).await.map(|_| ())
        };
        if let Err(e) = result {
            warn!("Failed to update local flags of item {}: {e}", item.id);
            return Err(e);
        }
        info!(
            "Item {} now favorite={} saved={}",
            item.id, item.is_favorite, item.is_saved
        );

        let rerun = {
            let mut state = self.lock_state();
            for entry in state.working_list.iter_mut().filter(|entry| entry.same_entry(&item)) {
                entry.adopt_local_flags(&item);
            }
            let settled = self.inner.channel.current().is_success();
            match state.active_query {
                // While a request is in flight it owns the channel.
                Some(local @ (ActiveQuery::Favorites | ActiveQuery::Saved)) if settled => {
                    Some((Self::begin_locked(&self.inner.channel, &mut state), local))
                }
                _ => {
                    if settled {
                        let displayed = state.displayed();
                        self.inner.channel.finish(ResultState::Success(displayed));
                    }
                    None
                }
            }
        };

        if let Some((ticket, query)) = rerun {
            // Errors are already published on the channel.
            let _ = self.execute(ticket, query).await;
        }
        Ok(item)
    }

    // ===============================
    // REQUEST BOOKKEEPING
    // ===============================

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_request(&self) -> u64 {
        let mut state = self.lock_state();
        Self::begin_locked(&self.inner.channel, &mut state)
    }

    fn begin_locked(channel: &ResultChannel<Vec<CatalogItem>>, state: &mut EngineState) -> u64 {
        state.latest_request += 1;
        channel.begin();
        state.latest_request
    }

    /// Applies the outcome of request `ticket` unless a newer request was issued.
    fn complete(
        &self,
        ticket: u64,
        outcome: Result<Vec<CatalogItem>>,
        query: ActiveQuery,
    ) -> Result<Vec<CatalogItem>> {
        let mut state = self.lock_state();
        if ticket != state.latest_request {
            debug!(
                "Dropping stale response of request {ticket} ({query:?}); latest is {}",
                state.latest_request
            );
            return Err(CatalogError::Superseded);
        }

        match outcome {
            Ok(items) => {
                if let ActiveQuery::Page(page) = query {
                    state.page = page;
                }
                state.active_query = Some(query);
                state.filter = None;
                state.working_list = items.clone();
                info!("{query:?} delivered {} items", items.len());
                self.inner.channel.finish(ResultState::Success(items.clone()));
                Ok(items)
            }
            Err(e) => {
                warn!("{query:?} failed: {e}");
                self.inner.channel.finish(ResultState::Failure(e.clone()));
                Err(e)
            }
        }
    }

    /// Copies local flags from the store onto freshly fetched items. A store failure
    /// only costs the flags.
    async fn reconcile(&self, mut items: Vec<CatalogItem>) -> Vec<CatalogItem> {
        match self.inner.store.list_all().await {
            Ok(local) => {
                let local: HashMap<i64, CatalogItem> =
                    local.into_iter().map(|item| (item.id, item)).collect();
                for item in &mut items {
                    if let Some(stored) = local.get(&item.id) {
                        item.adopt_local_flags(stored);
                    }
                }
            }
            Err(e) => warn!("Could not read local flags, showing remote data only: {e}"),
        }
        items
    }
}
