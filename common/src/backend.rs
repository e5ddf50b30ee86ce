//! 検出バックエンドのワイヤーフォーマット
//!
//! `POST /detect` のレスポンスは2形式ある:
//! - 単一画像: `{ "detections": [...] }`
//! - PDF: `{ "file_type": "pdf", "total_pages": N, "pages": [{ "detections", "image_width", "image_height" }] }`
//!
//! どちらも [`DetectionBatch`] に正規化してからセッションに渡す。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geometry::Size;
use crate::types::Detection;

/// 信頼度・IoU閾値（クエリパラメータとして送る）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub confidence: f64,
    pub iou: f64,
}

impl Thresholds {
    pub fn new(confidence: f64, iou: f64) -> Self {
        Self {
            confidence: clamp_unit(confidence),
            iou: clamp_unit(iou),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { confidence: 0.25, iou: 0.45 }
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// バックエンド接続状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendStatus {
    /// まだ一度も確認していない
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

impl BackendStatus {
    /// 検出を実行してよいか（未確認の間は許可する）
    pub fn allows_detect(&self) -> bool {
        !matches!(self, BackendStatus::Disconnected)
    }
}

impl std::fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendStatus::Unknown => write!(f, "unknown"),
            BackendStatus::Connected => write!(f, "connected"),
            BackendStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageDetections {
    /// 省略時は配列の位置から決める
    #[serde(default, alias = "page_number")]
    pub page: Option<u32>,

    #[serde(default)]
    pub detections: Vec<Detection>,

    #[serde(default)]
    pub image_width: Option<u32>,

    #[serde(default)]
    pub image_height: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectResponse {
    #[serde(default)]
    pub detections: Vec<Detection>,

    #[serde(default)]
    pub file_type: Option<String>,

    #[serde(default)]
    pub total_pages: Option<u32>,

    #[serde(default)]
    pub pages: Vec<PageDetections>,

    #[serde(default)]
    pub image_width: Option<u32>,

    #[serde(default)]
    pub image_height: Option<u32>,
}

/// 正規化済みの検出結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionBatch {
    /// 全ページ分。PDFの場合はすべて `page` が埋まっている
    pub detections: Vec<Detection>,
    /// バックエンドが報告したページごとの座標系サイズ
    pub page_sizes: BTreeMap<u32, Size>,
    pub multi_page: bool,
}

impl DetectionBatch {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }
}

fn reported_size(width: Option<u32>, height: Option<u32>) -> Option<Size> {
    match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Some(Size::from_pixels(w, h)),
        _ => None,
    }
}

impl DetectResponse {
    /// レスポンス本文をパースし、座標と信頼度の妥当性を確認する
    pub fn parse(text: &str) -> Result<Self> {
        let response: DetectResponse = serde_json::from_str(text)?;
        let all = response
            .detections
            .iter()
            .chain(response.pages.iter().flat_map(|p| p.detections.iter()));
        for det in all {
            let b = &det.bbox;
            if ![b.x, b.y, b.width, b.height].iter().all(|v| v.is_finite()) || b.width < 0.0 || b.height < 0.0 {
                return Err(Error::Parse(format!("不正なbbox: {} {:?}", det.class_name, [b.x, b.y, b.width, b.height])));
            }
            if !(0.0..=1.0).contains(&det.confidence) {
                return Err(Error::Parse(format!("信頼度が範囲外: {} {}", det.class_name, det.confidence)));
            }
            if det.page == Some(0) {
                return Err(Error::Parse(format!("ページ番号は1以上: {}", det.class_name)));
            }
        }
        if response.pages.iter().any(|p| p.page == Some(0)) {
            return Err(Error::Parse("ページ番号は1以上".to_string()));
        }
        Ok(response)
    }

    pub fn is_multi_page(&self) -> bool {
        self.file_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("pdf")) || !self.pages.is_empty()
    }

    pub fn into_batch(self) -> DetectionBatch {
        let mut page_sizes = BTreeMap::new();

        if !self.is_multi_page() {
            if let Some(size) = reported_size(self.image_width, self.image_height) {
                page_sizes.insert(1, size);
            }
            return DetectionBatch {
                detections: self.detections,
                page_sizes,
                multi_page: false,
            };
        }

        // トップレベルに置かれたPDFの検出も捨てない（page 未指定は1ページ目）
        let mut detections: Vec<Detection> = self
            .detections
            .into_iter()
            .map(|mut det| {
                det.page.get_or_insert(1);
                det
            })
            .collect();
        for (index, page) in self.pages.into_iter().enumerate() {
            let page_number = page.page.unwrap_or(index as u32 + 1);
            if let Some(size) = reported_size(page.image_width, page.image_height) {
                page_sizes.insert(page_number, size);
            }
            detections.extend(page.detections.into_iter().map(|mut det| {
                det.page.get_or_insert(page_number);
                det
            }));
        }

        DetectionBatch {
            detections,
            page_sizes,
            multi_page: true,
        }
    }
}

/// `GET /model/info`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(default)]
    pub model_loaded: bool,

    #[serde(default)]
    pub model_path: Option<String>,

    #[serde(default)]
    pub model_type: Option<String>,

    #[serde(default)]
    pub num_classes: Option<u32>,

    /// 配列 `["Caption", ...]` またはマップ `{"0": "Caption", ...}`
    #[serde(default)]
    pub class_names: serde_json::Value,
}

impl ModelInfo {
    /// クラス名をID順に並べる
    pub fn class_name_list(&self) -> Vec<String> {
        match &self.class_names {
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            serde_json::Value::Object(map) => {
                let mut entries: Vec<(u64, String)> = map
                    .iter()
                    .filter_map(|(k, v)| Some((k.parse().ok()?, v.as_str()?.to_string())))
                    .collect();
                entries.sort_by_key(|(id, _)| *id);
                entries.into_iter().map(|(_, name)| name).collect()
            }
            _ => Vec::new(),
        }
    }
}
