//! pdfium によるPDFレンダリング
//!
//! ライブラリは呼び出しごとにバインドする（システム → カレントディレクトリの順）。
//! `Pdfium` はスレッド間で共有できないため、インスタンスを保持しない。

use super::{EngineError, PageVisitor, PdfEngine, RenderFailure};
use image::RgbaImage;
use pdfium_render::prelude::*;
use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct PdfiumEngine {
    /// 指定時はこのディレクトリの pdfium を優先する
    library_dir: Option<PathBuf>,
}

impl PdfiumEngine {
    pub fn with_library_dir(dir: PathBuf) -> Self {
        Self { library_dir: Some(dir) }
    }

    fn bind(&self) -> Result<Pdfium, EngineError> {
        let bindings = match &self.library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_system_library()
                .or_else(|_| Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))),
        }
        .map_err(|e| EngineError::Unavailable(e.to_string()))?;
        Ok(Pdfium::new(bindings))
    }
}

impl PdfEngine for PdfiumEngine {
    fn page_count(&self, bytes: &[u8]) -> Result<usize, EngineError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| EngineError::Open(e.to_string()))?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(&self, bytes: &[u8], index: usize, scale: f32) -> Result<RgbaImage, EngineError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| EngineError::Open(e.to_string()))?;

        let index = u16::try_from(index).map_err(|_| EngineError::Render(format!("page index {} out of range", index)))?;
        let page = document
            .pages()
            .get(index)
            .map_err(|e| EngineError::Render(e.to_string()))?;
        render(&page, scale)
    }

    /// バインドと読み込みは1回だけ
    fn render_pages(&self, bytes: &[u8], scale: f32, visit: &mut PageVisitor<'_>) -> Result<(), RenderFailure> {
        let pdfium = self.bind().map_err(RenderFailure::Open)?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| RenderFailure::Open(EngineError::Open(e.to_string())))?;

        let pages = document.pages();
        let total = pages.len() as usize;
        for (index, page) in pages.iter().enumerate() {
            let image = render(&page, scale).map_err(|source| RenderFailure::Page { index, source })?;
            visit(index, total, image).map_err(|source| RenderFailure::Page { index, source })?;
        }
        Ok(())
    }
}

fn render(page: &PdfPage<'_>, scale: f32) -> Result<RgbaImage, EngineError> {
    let config = PdfRenderConfig::new().scale_page_by_factor(scale);
    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| EngineError::Render(e.to_string()))?;

    let width = bitmap.width() as u32;
    let height = bitmap.height() as u32;
    RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes())
        .ok_or_else(|| EngineError::Render(format!("bitmap size mismatch ({}x{})", width, height)))
}
