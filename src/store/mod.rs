//! 結果の保存先
//!
//! - [`JsonFileStore`]: `{ results, lastUpdated }` 形式のJSONファイル（既定）
//! - [`HttpResultStore`]: `/api/save-result` API（個別削除なし）
//!
//! どちらを使うかは設定で決める（`results_api_url` があればAPI）。

pub mod file;
pub mod http;

use crate::config::Config;
use crate::error::Result;
use layout_review_common::{ResultRecord, StoreFile};
use std::future::Future;

pub use file::{FallbackPolicy, JsonFileStore};
pub use http::HttpResultStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOutcome {
    /// 保存後の総件数
    pub total_results: usize,
}

pub trait ResultStore: Send + Sync {
    fn list(&self) -> impl Future<Output = Result<StoreFile>> + Send;

    /// 同名（大文字小文字無視）のレコードがあれば `Conflict` で、何も書き込まない
    fn save(&self, record: ResultRecord) -> impl Future<Output = Result<SaveOutcome>> + Send;

    /// 該当IDがなければ `Ok(false)`
    fn delete(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;

    fn clear(&self) -> impl Future<Output = Result<()>> + Send;
}

/// 設定で選ばれた保存先
#[derive(Debug)]
pub enum AnyStore {
    File(JsonFileStore),
    Http(HttpResultStore),
}

impl AnyStore {
    pub fn from_config(config: &Config) -> Result<Self> {
        if let Some(url) = &config.results_api_url {
            log::debug!("result store: {}", url);
            return Ok(AnyStore::Http(HttpResultStore::from_config(url, config)?));
        }

        let policy = match &config.results_fallback_path {
            Some(path) => FallbackPolicy::FallbackTo(path.clone()),
            None => FallbackPolicy::PrimaryOnly,
        };
        let store = JsonFileStore::open(config.resolved_results_path()?, policy)?;
        log::debug!("result store: {}", store.path().display());
        Ok(AnyStore::File(store))
    }

    pub fn describe(&self) -> String {
        match self {
            AnyStore::File(store) => store.path().display().to_string(),
            AnyStore::Http(store) => store.endpoint().to_string(),
        }
    }
}

impl ResultStore for AnyStore {
    async fn list(&self) -> Result<StoreFile> {
        match self {
            AnyStore::File(store) => store.list().await,
            AnyStore::Http(store) => store.list().await,
        }
    }

    async fn save(&self, record: ResultRecord) -> Result<SaveOutcome> {
        match self {
            AnyStore::File(store) => store.save(record).await,
            AnyStore::Http(store) => store.save(record).await,
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        match self {
            AnyStore::File(store) => store.delete(id).await,
            AnyStore::Http(store) => store.delete(id).await,
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            AnyStore::File(store) => store.clear().await,
            AnyStore::Http(store) => store.clear().await,
        }
    }
}
