//! 保存API `/api/save-result` クライアント
//!
//! - GET    → `{ results, lastUpdated }`
//! - POST   → `201 { totalResults }` / `409 { error: "duplicate" }`
//! - DELETE → 全件削除（個別削除はない）

use super::{ResultStore, SaveOutcome};
use crate::backend::ensure_success;
use crate::config::Config;
use crate::error::{ReviewError, Result};
use layout_review_common::{ResultRecord, StoreFile};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpResultStore {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SaveResponse {
    #[serde(default)]
    total_results: Option<usize>,
}

impl HttpResultStore {
    /// `base_url` はサイトのルート（`/api/save-result` を付け足す）
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReviewError::Config(format!("HTTPクライアントを作成できません: {}", e)))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/save-result", base_url.trim_end_matches('/')),
        })
    }

    pub fn from_config(base_url: &str, config: &Config) -> Result<Self> {
        Self::new(base_url, Duration::from_secs(config.timeout_seconds))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ResultStore for HttpResultStore {
    async fn list(&self) -> Result<StoreFile> {
        let response = self.client.get(&self.endpoint).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn save(&self, record: ResultRecord) -> Result<SaveOutcome> {
        let name = record.image_name().to_string();
        let response = self.client.post(&self.endpoint).json(&record).send().await?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(ReviewError::Conflict(name));
        }
        let response = ensure_success(response).await?;

        let body: SaveResponse = response.json().await?;
        Ok(SaveOutcome {
            total_results: body.total_results.unwrap_or_default(),
        })
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Err(ReviewError::Unsupported(format!("個別削除 (id={})", id)))
    }

    async fn clear(&self) -> Result<()> {
        let response = self.client.delete(&self.endpoint).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint() {
        let store = HttpResultStore::new("http://dash.local/", Duration::from_secs(5)).unwrap();
        assert_eq!(store.endpoint(), "http://dash.local/api/save-result");
    }

    #[tokio::test]
    async fn test_delete_is_unsupported() {
        let store = HttpResultStore::new("http://dash.local", Duration::from_secs(5)).unwrap();
        let err = store.delete("abc").await.unwrap_err();
        assert!(matches!(err, ReviewError::Unsupported(_)));
    }

    #[test]
    fn test_save_response_shape() {
        let body: SaveResponse = serde_json::from_str(r#"{"success": true, "totalResults": 7}"#).unwrap();
        assert_eq!(body.total_results, Some(7));
    }
}
