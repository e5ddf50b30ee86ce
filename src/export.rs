//! ローカルへのエクスポート（ネットワークは使わない）
//!
//! - `{stem}_detections.json`: 保存レコードから `id` を除いた形
//! - `{stem}_page{n}.png`: ページごとのアノテーション画像

use crate::error::Result;
use crate::render::RasterSurface;
use crate::session::Session;
use ab_glyph::FontArc;
use layout_review_common::{export_file_name, RecordBody};
use std::path::{Path, PathBuf};

/// 画像名から拡張子とディレクトリを除いた部分
pub fn file_stem(image_name: &str) -> &str {
    let stem = Path::new(image_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    if stem.is_empty() {
        "result"
    } else {
        stem
    }
}

pub fn write_json(body: &RecordBody, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(export_file_name(&body.image_name));
    let json = serde_json::to_string_pretty(body)?;
    std::fs::write(&path, json)?;
    Ok(path)
}

/// 全ページを描画してPNGで書き出す（ズーム・パンはセッションの状態に従う）
pub fn write_annotated_pages(session: &Session, font: Option<FontArc>, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let Some(document) = session.document() else {
        return Ok(Vec::new());
    };
    std::fs::create_dir_all(output_dir)?;

    let stem = file_stem(document.file().name());
    let mut surface = RasterSurface::new(font);
    let mut written = Vec::with_capacity(document.pages().len());

    for page in document.pages() {
        let n = page.page_number();
        session.render_page(&mut surface, n)?;
        let path = output_dir.join(format!("{}_page{}.png", stem, n));
        surface.save_png(&path)?;
        log::debug!("wrote {}", path.display());
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("scan.page.pdf"), "scan.page");
        assert_eq!(file_stem("dir/photo.jpg"), "photo");
        assert_eq!(file_stem(""), "result");
    }
}
