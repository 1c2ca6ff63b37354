//! Paged remote catalog source.
//!
//! [`RemoteSource`] hands out one page of catalog items per call. [`HttpRemoteSource`]
//! implements it against a TMDB-style REST endpoint (`/movie/popular?page=N`).

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;

use crate::catalog_item::CatalogItem;
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};

/// Fetches pages of catalog items from upstream.
///
/// Implementations return items in upstream order and report every non-success
/// condition as [`CatalogError::Network`] or [`CatalogError::Server`].
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetches page `page` (1-based).
    async fn fetch_page(&self, page: u32) -> Result<Vec<CatalogItem>>;
}

/// Rejects page numbers below 1 before any I/O happens.
pub fn check_page(page: u32) -> Result<()> {
    if page == 0 {
        return Err(CatalogError::InvalidPage(page));
    }
    Ok(())
}

/// Wire shape of one movie in a page response. Local-only flags are deliberately
/// absent so they can never be taken from upstream.
#[derive(Debug, Deserialize)]
struct RemoteMovie {
    id: i64,
    #[serde(alias = "original_title")]
    title: String,
    #[serde(default)]
    backdrop_path: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    vote_average: f64,
    #[serde(default)]
    vote_count: u64,
}

impl From<RemoteMovie> for CatalogItem {
    fn from(movie: RemoteMovie) -> Self {
        CatalogItem::new(movie.id, movie.title)
            .with_images(movie.backdrop_path, movie.poster_path)
            .with_votes(movie.vote_average, movie.vote_count)
    }
}

#[derive(Debug, Deserialize)]
struct RemotePage {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    results: Vec<RemoteMovie>,
}

/// Decodes a page response body into catalog items.
///
/// # Errors
///
/// An undecodable body is unusable as a response and reported as
/// [`CatalogError::Network`].
pub fn parse_page(body: &str) -> Result<Vec<CatalogItem>> {
    let page: RemotePage = serde_json::from_str(body)
        .map_err(|e| CatalogError::Network(format!("Invalid page payload: {e}")))?;
    debug!("Decoded page {} with {} results", page.page, page.results.len());
    Ok(page.results.into_iter().map(CatalogItem::from).collect())
}

/// [`RemoteSource`] speaking to a TMDB-compatible HTTP API.
#[derive(Debug, Clone)]
pub struct HttpRemoteSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    language: String,
}

impl HttpRemoteSource {
    /// # Errors
    ///
    /// Returns [`CatalogError::Config`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        language: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Config(format!("Cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            language: language.into(),
        })
    }

    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        Self::new(
            config.api_base_url.clone(),
            config.api_key.clone(),
            config.language.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn page_url(&self) -> String {
        format!("{}/movie/popular", self.base_url)
    }
}

#[async_trait]
impl RemoteSource for HttpRemoteSource {
    async fn fetch_page(&self, page: u32) -> Result<Vec<CatalogItem>> {
        check_page(page)?;

        let url = self.page_url();
        debug!("Fetching page {page} from {url}");

        let page_param = page.to_string();
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("language", self.language.as_str()),
                ("page", page_param.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            warn!("Catalog page {page} returned status {}", status.as_u16());
            return Err(CatalogError::Server {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await?;
        let items = parse_page(&body)?;
        info!("Fetched catalog page {page}: {} items", items.len());
        Ok(items)
    }
}
