//! 検出バックエンド
//!
//! - `POST {base}/detect?confidence=..&iou=..` (multipart `file`)
//! - `GET {base}/` 死活確認
//! - `GET {base}/model/info`

use crate::config::Config;
use crate::error::{ReviewError, Result};
use crate::upload::UploadedFile;
use layout_review_common::{DetectResponse, ModelInfo, Thresholds};
use std::future::Future;
use std::time::Duration;

/// 検出バックエンドとの境界（テストでは差し替える）
pub trait DetectionBackend: Send + Sync {
    /// 到達できれば Ok
    fn health(&self) -> impl Future<Output = Result<()>> + Send;

    fn model_info(&self) -> impl Future<Output = Result<ModelInfo>> + Send;

    /// 元のアップロードバイト列をそのまま送る
    fn detect(&self, file: &UploadedFile, thresholds: Thresholds) -> impl Future<Output = Result<DetectResponse>> + Send;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReviewError::Config(format!("HTTPクライアントを作成できません: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.backend_url, Duration::from_secs(config.timeout_seconds))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// 2xx 以外は本文付きで BackendStatus にする
pub(crate) async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ReviewError::BackendStatus {
        status: status.as_u16(),
        body,
    })
}

impl DetectionBackend for HttpBackend {
    async fn health(&self) -> Result<()> {
        let response = self.client.get(self.url("/")).send().await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn model_info(&self) -> Result<ModelInfo> {
        let response = self.client.get(self.url("/model/info")).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn detect(&self, file: &UploadedFile, thresholds: Thresholds) -> Result<DetectResponse> {
        let part = reqwest::multipart::Part::bytes(file.bytes().to_vec())
            .file_name(file.name().to_string())
            .mime_str(file.mime())?;
        let form = reqwest::multipart::Form::new().part("file", part);

        log::debug!(
            "POST {}/detect ({}, {} bytes, confidence={}, iou={})",
            self.base_url,
            file.name(),
            file.size(),
            thresholds.confidence,
            thresholds.iou
        );

        let response = self
            .client
            .post(self.url("/detect"))
            .query(&[("confidence", thresholds.confidence), ("iou", thresholds.iou)])
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let text = response.text().await?;
        Ok(DetectResponse::parse(&text)?)
    }
}
