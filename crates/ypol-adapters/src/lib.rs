//! Upstream catalog adapter, page cursor and region-table loader.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;
use ypol_core::{GeoTable, RawPolicyRecord};
use ypol_storage::{FetchError, HttpFetcher};

pub mod advisor;

pub use advisor::{
    parse_advisor_output, AdvisorError, AdvisorReply, AdvisorRequest, PolicyAdvisor,
    ProcessAdvisor, Recommendation,
};

pub const CRATE_NAME: &str = "ypol-adapters";

/// Items requested per catalog page.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("fetching catalog page {page_num}: {source}")]
    Fetch {
        page_num: u32,
        #[source]
        source: FetchError,
    },
    #[error("decoding catalog page {page_num}: {source}")]
    Decode {
        page_num: u32,
        #[source]
        source: serde_json::Error,
    },
    #[error("reading catalog fixture {path}: {source}")]
    Fixture {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("reading region table {path}: {source}")]
    GeoTable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Message(String),
}

/// A paginated source of raw policy records.
#[async_trait]
pub trait PolicySource: Send + Sync {
    fn source_id(&self) -> &'static str;

    /// Fetch one 1-based page. An empty vector means there are no further pages.
    async fn fetch_page(
        &self,
        run_id: Uuid,
        page_num: u32,
    ) -> Result<Vec<RawPolicyRecord>, SourceError>;
}

#[derive(Debug, Deserialize)]
struct CatalogEnvelope {
    #[serde(default)]
    result: Option<CatalogResult>,
}

#[derive(Debug, Deserialize)]
struct CatalogResult {
    #[serde(default, rename = "youthPolicyList")]
    youth_policy_list: Option<Vec<RawPolicyRecord>>,
}

/// Decode one catalog response body. A missing `result.youthPolicyList` is an empty page.
pub fn parse_catalog_page(page_num: u32, body: &[u8]) -> Result<Vec<RawPolicyRecord>, SourceError> {
    let envelope: CatalogEnvelope =
        serde_json::from_slice(body).map_err(|source| SourceError::Decode { page_num, source })?;
    Ok(envelope
        .result
        .and_then(|r| r.youth_policy_list)
        .unwrap_or_default())
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub api_key: String,
    pub page_size: u32,
}

/// The government youth-policy catalog API.
#[derive(Debug, Clone)]
pub struct YouthPolicyCatalog {
    http: Arc<HttpFetcher>,
    config: CatalogConfig,
}

impl YouthPolicyCatalog {
    pub fn new(http: Arc<HttpFetcher>, config: CatalogConfig) -> Self {
        Self { http, config }
    }

    fn page_query(&self, page_num: u32) -> Vec<(&'static str, String)> {
        vec![
            ("apiKeyNm", self.config.api_key.clone()),
            ("rtnType", "json".to_string()),
            ("pageNum", page_num.to_string()),
            ("pageSize", self.config.page_size.max(1).to_string()),
        ]
    }
}

#[async_trait]
impl PolicySource for YouthPolicyCatalog {
    fn source_id(&self) -> &'static str {
        "youth-policy-catalog"
    }

    async fn fetch_page(
        &self,
        run_id: Uuid,
        page_num: u32,
    ) -> Result<Vec<RawPolicyRecord>, SourceError> {
        let query = self.page_query(page_num);
        let body = self
            .http
            .fetch_bytes(run_id, &self.config.base_url, &query)
            .await
            .map_err(|source| SourceError::Fetch { page_num, source })?;
        parse_catalog_page(page_num, &body)
    }
}

/// Replays catalog responses saved as `page_<n>.json`; the first missing page ends the catalog.
#[derive(Debug, Clone)]
pub struct FixtureCatalog {
    dir: PathBuf,
}

impl FixtureCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn page_path(&self, page_num: u32) -> PathBuf {
        self.dir.join(format!("page_{page_num}.json"))
    }
}

#[async_trait]
impl PolicySource for FixtureCatalog {
    fn source_id(&self) -> &'static str {
        "fixture-catalog"
    }

    async fn fetch_page(
        &self,
        _run_id: Uuid,
        page_num: u32,
    ) -> Result<Vec<RawPolicyRecord>, SourceError> {
        let path = self.page_path(page_num);
        match tokio::fs::read(&path).await {
            Ok(body) => parse_catalog_page(page_num, &body),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(SourceError::Fixture {
                path: path.display().to_string(),
                source,
            }),
        }
    }
}

/// One non-empty page handed out by a [`PageCursor`].
#[derive(Debug, Clone)]
pub struct Page {
    pub page_num: u32,
    pub records: Vec<RawPolicyRecord>,
}

/// Walks a source page by page, starting at page 1, until the first empty page.
///
/// Each call to [`PageCursor::next_page`] performs exactly one fetch; nothing is prefetched.
pub struct PageCursor<'a> {
    source: &'a dyn PolicySource,
    run_id: Uuid,
    next_page_num: u32,
    finished: bool,
}

impl<'a> PageCursor<'a> {
    pub fn new(source: &'a dyn PolicySource, run_id: Uuid) -> Self {
        Self {
            source,
            run_id,
            next_page_num: 1,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Pages fetched so far, including the terminating empty page.
    pub fn pages_fetched(&self) -> u32 {
        self.next_page_num - 1
    }

    pub async fn next_page(&mut self) -> Result<Option<Page>, SourceError> {
        if self.finished {
            return Ok(None);
        }
        let page_num = self.next_page_num;
        let records = match self.source.fetch_page(self.run_id, page_num).await {
            Ok(records) => records,
            Err(err) => {
                self.finished = true;
                return Err(err);
            }
        };
        self.next_page_num += 1;
        if records.is_empty() {
            self.finished = true;
            info!(source = self.source.source_id(), page_num, "catalog exhausted");
            return Ok(None);
        }
        debug!(source = self.source.source_id(), page_num, items = records.len(), "fetched page");
        Ok(Some(Page { page_num, records }))
    }
}

/// Read the tab-delimited legal district code file.
pub async fn load_geo_table(path: impl AsRef<Path>) -> Result<GeoTable, SourceError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SourceError::GeoTable {
            path: path.display().to_string(),
            source,
        })?;
    let table = GeoTable::parse(&text);
    info!(path = %path.display(), entries = table.len(), "loaded region table");
    Ok(table)
}
