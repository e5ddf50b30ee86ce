//! ページラスタライズ
//!
//! - 画像: デコードして1ページ扱い
//! - PDF: [`PdfEngine`] で1ページずつ固定倍率でレンダリング
//!
//! 失敗時は最初に失敗したページで中断し、途中までのページは返さない。

#[cfg(feature = "pdfium")]
pub mod pdfium;

use crate::error::{ReviewError, Result};
use crate::upload::{is_pdf, FileKind, UploadedFile};
use image::RgbaImage;
use layout_review_common::Size;
use std::sync::Arc;
use thiserror::Error;

/// PDFポイントに対する既定倍率
pub const DEFAULT_RENDER_SCALE: f32 = 2.0;

/// ラスタ済みページ（生成後は不変）
#[derive(Debug, Clone)]
pub struct PageImage {
    page_number: u32,
    image: Arc<RgbaImage>,
}

impl PageImage {
    pub fn new(page_number: u32, image: RgbaImage) -> Self {
        Self {
            page_number,
            image: Arc::new(image),
        }
    }

    /// 1始まり
    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn natural_size(&self) -> Size {
        Size::from_pixels(self.width(), self.height())
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("document could not be opened: {0}")]
    Open(String),

    #[error("page could not be rendered: {0}")]
    Render(String),

    #[error("PDF engine unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum RenderFailure {
    #[error(transparent)]
    Open(EngineError),

    /// `index` は0始まり
    #[error("page index {index}: {source}")]
    Page { index: usize, source: EngineError },
}

/// ページを受け取るコールバック。`(index, total, image)`、Err で打ち切り
pub type PageVisitor<'a> = dyn FnMut(usize, usize, RgbaImage) -> std::result::Result<(), EngineError> + 'a;

/// 外部PDFエンジンとの境界
///
/// 実装はブロッキングでよい（呼び出し側が `spawn_blocking` する）。
pub trait PdfEngine: Send + Sync {
    fn page_count(&self, bytes: &[u8]) -> std::result::Result<usize, EngineError>;

    /// `index` は0始まり
    fn render_page(&self, bytes: &[u8], index: usize, scale: f32) -> std::result::Result<RgbaImage, EngineError>;

    /// 全ページを先頭から順に描画して `visit` に渡す
    ///
    /// 既定実装はページごとに `render_page` を呼ぶ。文書を一度だけ開けるエンジンは上書きする。
    fn render_pages(&self, bytes: &[u8], scale: f32, visit: &mut PageVisitor<'_>) -> std::result::Result<(), RenderFailure> {
        let total = self.page_count(bytes).map_err(RenderFailure::Open)?;
        for index in 0..total {
            let image = self
                .render_page(bytes, index, scale)
                .map_err(|source| RenderFailure::Page { index, source })?;
            visit(index, total, image).map_err(|source| RenderFailure::Page { index, source })?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct Rasterizer {
    engine: Option<Arc<dyn PdfEngine>>,
    scale: f32,
}

impl std::fmt::Debug for Rasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rasterizer")
            .field("pdf", &self.engine.is_some())
            .field("scale", &self.scale)
            .finish()
    }
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::images_only()
    }
}

impl Rasterizer {
    pub fn new(engine: Arc<dyn PdfEngine>, scale: f32) -> Self {
        Self {
            engine: Some(engine),
            scale,
        }
    }

    /// PDFエンジンなし（画像のみ対応）
    pub fn images_only() -> Self {
        Self {
            engine: None,
            scale: DEFAULT_RENDER_SCALE,
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn supports_pdf(&self) -> bool {
        self.engine.is_some()
    }

    /// アップロードファイルをページ列に変換
    pub async fn load_pages(&self, file: &UploadedFile) -> Result<Vec<PageImage>> {
        let bytes = file.shared_bytes();
        match file.kind() {
            FileKind::Image => {
                let page = tokio::task::spawn_blocking(move || decode_image(&bytes))
                    .await
                    .map_err(|e| ReviewError::Decode(format!("デコードタスクが異常終了: {}", e)))??;
                Ok(vec![page])
            }
            FileKind::Pdf => self.rasterize(bytes).await,
        }
    }

    /// PDFを全ページラスタライズ
    ///
    /// 中断はできない。新しいアップロードが来た場合は呼び出し側が結果を捨てる。
    pub async fn rasterize(&self, bytes: Arc<[u8]>) -> Result<Vec<PageImage>> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.rasterize_blocking(&bytes, |_, _| {}))
            .await
            .map_err(|e| ReviewError::Rasterization {
                page: 0,
                reason: format!("レンダリングタスクが異常終了: {}", e),
            })?
    }

    /// `progress(rendered, total)` はページ完了ごとに呼ばれる
    pub fn rasterize_blocking(
        &self,
        bytes: &[u8],
        mut progress: impl FnMut(usize, usize),
    ) -> Result<Vec<PageImage>> {
        if !is_pdf(bytes) {
            return Err(ReviewError::UnsupportedFormat("PDFヘッダがありません".into()));
        }

        let engine = self
            .engine
            .as_ref()
            .ok_or_else(|| ReviewError::UnsupportedFormat("PDFエンジンが設定されていません".into()))?;

        let mut pages = Vec::new();
        let mut visit = |index: usize, total: usize, image: RgbaImage| {
            if image.width() == 0 || image.height() == 0 {
                return Err(EngineError::Render("サイズ0の画像が返されました".into()));
            }
            let page_number = index + 1;
            log::debug!("rasterized page {}/{} ({}x{})", page_number, total, image.width(), image.height());
            pages.push(PageImage::new(page_number as u32, image));
            progress(page_number, total);
            Ok(())
        };

        engine
            .render_pages(bytes, self.scale, &mut visit)
            .map_err(|failure| match failure {
                RenderFailure::Open(e) => ReviewError::UnsupportedFormat(e.to_string()),
                RenderFailure::Page { index, source } => ReviewError::Rasterization {
                    page: index + 1,
                    reason: source.to_string(),
                },
            })?;

        if pages.is_empty() {
            return Err(ReviewError::UnsupportedFormat("ページがありません".into()));
        }
        Ok(pages)
    }
}

/// 画像をデコード（1ページ目として扱う）
pub fn decode_image(bytes: &[u8]) -> Result<PageImage> {
    let decoded = image::load_from_memory(bytes).map_err(|e| ReviewError::Decode(e.to_string()))?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(ReviewError::Decode("画像サイズが0です".into()));
    }
    Ok(PageImage::new(1, decoded.to_rgba8()))
}

/// 設定からPDFエンジンを組み立てる
#[cfg(feature = "pdfium")]
pub fn rasterizer_from_config(config: &crate::config::Config) -> Rasterizer {
    let engine = match &config.pdfium_dir {
        Some(dir) => pdfium::PdfiumEngine::with_library_dir(dir.clone()),
        None => pdfium::PdfiumEngine::default(),
    };
    Rasterizer::new(Arc::new(engine), config.render_scale)
}

#[cfg(not(feature = "pdfium"))]
pub fn rasterizer_from_config(config: &crate::config::Config) -> Rasterizer {
    log::debug!("built without pdfium; PDF uploads will be rejected");
    Rasterizer {
        engine: None,
        scale: config.render_scale,
    }
}
