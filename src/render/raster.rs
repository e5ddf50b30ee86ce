//! RGBA画像への描画（PNG書き出し用）

use super::Surface;
use crate::error::{ReviewError, Result};
use ab_glyph::{FontArc, PxScale};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size, Blend};
use imageproc::rect::Rect as PixelRect;
use layout_review_common::{Color, Point, Rect, Size};
use std::path::Path;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const LABEL_FONT_PX: f32 = 14.0;
const LABEL_PADDING: u32 = 3;
/// フォントがない場合のラベル帯の高さ
const CHIP_ONLY_HEIGHT: u32 = 6;
const CHIP_ONLY_WIDTH: u32 = 24;

/// フォント候補（設定で指定がない場合に順に探す）
const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// ラベル用フォントを読み込む
///
/// `explicit` が指定されていて読めない場合はエラー。未指定なら候補を探し、
/// 見つからなければ `None`（ラベルは色帯のみになる）。
pub fn load_font(explicit: Option<&Path>) -> Result<Option<FontArc>> {
    if let Some(path) = explicit {
        let bytes = std::fs::read(path)?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| ReviewError::Config(format!("フォントを読み込めません ({}): {}", path.display(), e)))?;
        return Ok(Some(font));
    }

    for candidate in FONT_CANDIDATES {
        let Ok(bytes) = std::fs::read(candidate) else {
            continue;
        };
        match FontArc::try_from_vec(bytes) {
            Ok(font) => {
                log::debug!("label font: {}", candidate);
                return Ok(Some(font));
            }
            Err(e) => log::debug!("skip font {}: {}", candidate, e),
        }
    }

    log::warn!("ラベル用フォントが見つかりません。ラベルは色帯のみ描画します");
    Ok(None)
}

pub struct RasterSurface {
    canvas: RgbaImage,
    font: Option<FontArc>,
}

impl RasterSurface {
    pub fn new(font: Option<FontArc>) -> Self {
        Self {
            canvas: RgbaImage::new(0, 0),
            font,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.canvas
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        self.canvas
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| ReviewError::Decode(format!("PNG書き出しに失敗 ({}): {}", path.display(), e)))
    }

    /// 画像範囲に切り詰めたピクセル矩形 (x0, y0, x1, y1)。空なら None
    fn clip(&self, rect: Rect) -> Option<(u32, u32, u32, u32)> {
        let w = self.canvas.width() as f64;
        let h = self.canvas.height() as f64;
        let x0 = rect.x.round().clamp(0.0, w) as u32;
        let y0 = rect.y.round().clamp(0.0, h) as u32;
        let x1 = (rect.x + rect.width).round().clamp(0.0, w) as u32;
        let y1 = (rect.y + rect.height).round().clamp(0.0, h) as u32;
        (x1 > x0 && y1 > y0).then_some((x0, y0, x1, y1))
    }

    fn label_extent(&self, text: &str) -> (u32, u32) {
        match &self.font {
            Some(font) => {
                let (w, h) = text_size(PxScale::from(LABEL_FONT_PX), font, text);
                (w + LABEL_PADDING * 2, h + LABEL_PADDING * 2)
            }
            None => (CHIP_ONLY_WIDTH, CHIP_ONLY_HEIGHT),
        }
    }
}

fn rgba(color: Color) -> Rgba<u8> {
    Rgba([color.r, color.g, color.b, 255])
}

fn translucent(color: Color, opacity: f32) -> Rgba<u8> {
    let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgba([color.r, color.g, color.b, alpha])
}

impl Surface for RasterSurface {
    fn clear(&mut self, size: Size) {
        let w = size.width.round().max(1.0) as u32;
        let h = size.height.round().max(1.0) as u32;
        self.canvas = RgbaImage::from_pixel(w, h, BACKGROUND);
    }

    fn draw_page(&mut self, page: &RgbaImage, dest: Rect) {
        let w = dest.width.round() as u32;
        let h = dest.height.round() as u32;
        if w == 0 || h == 0 {
            return;
        }

        let x = dest.x.round() as i64;
        let y = dest.y.round() as i64;
        if page.width() == w && page.height() == h {
            imageops::overlay(&mut self.canvas, page, x, y);
        } else {
            let scaled = imageops::resize(page, w, h, FilterType::Triangle);
            imageops::overlay(&mut self.canvas, &scaled, x, y);
        }
    }

    fn fill_rect(&mut self, rect: Rect, color: Color, opacity: f32) {
        let Some((x0, y0, x1, y1)) = self.clip(rect) else {
            return;
        };
        let area = PixelRect::at(x0 as i32, y0 as i32).of_size(x1 - x0, y1 - y0);
        let mut canvas = Blend(std::mem::take(&mut self.canvas));
        draw_filled_rect_mut(&mut canvas, area, translucent(color, opacity));
        self.canvas = canvas.0;
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, width: f32) {
        let x = rect.x.round() as i32;
        let y = rect.y.round() as i32;
        let rw = rect.width.round().max(1.0) as u32;
        let rh = rect.height.round().max(1.0) as u32;
        let line = width.round().max(1.0) as i32;
        let color = rgba(color);

        // 内側へ1pxずつ重ねて線幅を出す
        for t in 0..line.min((rw as i32 + 1) / 2).min((rh as i32 + 1) / 2).max(1) {
            let inset = 2 * t as u32;
            let inner = PixelRect::at(x + t, y + t).of_size(rw.saturating_sub(inset).max(1), rh.saturating_sub(inset).max(1));
            draw_hollow_rect_mut(&mut self.canvas, inner, color);
        }
    }

    fn draw_label(&mut self, anchor: Point, text: &str, background: Color, foreground: Color) {
        let (chip_w, chip_h) = self.label_extent(text);
        let x = anchor.x.round() as i32;
        // 上に余白があれば枠の上、なければ枠の内側
        let y = if anchor.y.round() as i32 >= chip_h as i32 {
            anchor.y.round() as i32 - chip_h as i32
        } else {
            anchor.y.round() as i32
        };

        draw_filled_rect_mut(&mut self.canvas, PixelRect::at(x, y).of_size(chip_w, chip_h), rgba(background));

        if let Some(font) = &self.font {
            draw_text_mut(
                &mut self.canvas,
                rgba(foreground),
                x + LABEL_PADDING as i32,
                y + LABEL_PADDING as i32,
                PxScale::from(LABEL_FONT_PX),
                font,
                text,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::render;
    use layout_review_common::{AnnotatedDetection, BBox, CoordinateMapper, Detection, IdSequence};

    fn page(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([200, 200, 200, 255]))
    }

    fn one_detection() -> Vec<AnnotatedDetection> {
        let mut ids = IdSequence::new();
        vec![AnnotatedDetection::new(
            ids.next_id(),
            Detection {
                class_id: 8,
                class_name: "Table".into(),
                confidence: 0.8,
                bbox: BBox::new(100.0, 100.0, 200.0, 100.0),
                page: None,
            },
        )]
    }

    #[test]
    fn test_clear_sets_size_and_background() {
        let mut surface = RasterSurface::new(None);
        surface.clear(Size::new(40.0, 30.0));
        assert_eq!(surface.image().dimensions(), (40, 30));
        assert_eq!(*surface.image().get_pixel(5, 5), BACKGROUND);
    }

    #[test]
    fn test_page_is_scaled_to_display() {
        let mut surface = RasterSurface::new(None);
        surface.clear(Size::new(50.0, 25.0));
        surface.draw_page(&page(100, 50), Rect::new(0.0, 0.0, 50.0, 25.0));
        assert_eq!(*surface.image().get_pixel(49, 24), Rgba([200, 200, 200, 255]));
    }

    #[test]
    fn test_fill_is_translucent() {
        let mut surface = RasterSurface::new(None);
        surface.clear(Size::new(10.0, 10.0));
        surface.fill_rect(Rect::new(0.0, 0.0, 10.0, 10.0), Color::rgb(0, 0, 0), 0.5);
        let px = surface.image().get_pixel(3, 3);
        assert!((126..=128).contains(&px[0]), "{:?}", px);
        assert_eq!(px[3], 255);
        // 範囲外は塗らない
        surface.fill_rect(Rect::new(5.0, 5.0, 20.0, 20.0), Color::rgb(0, 0, 0), 1.0);
        assert_eq!(surface.image().get_pixel(9, 9)[0], 0);
        assert_eq!(surface.image().dimensions(), (10, 10));
    }

    #[test]
    fn test_stroke_width() {
        let red = Color::rgb(255, 0, 0);
        let mut surface = RasterSurface::new(None);
        surface.clear(Size::new(40.0, 40.0));
        surface.stroke_rect(Rect::new(10.0, 10.0, 20.0, 20.0), red, 3.0);

        let img = surface.image();
        assert_eq!(*img.get_pixel(10, 20), rgba(red));
        assert_eq!(*img.get_pixel(12, 20), rgba(red));
        assert_eq!(*img.get_pixel(13, 20), BACKGROUND);
    }

    #[test]
    fn test_degenerate_rects_do_not_panic() {
        let mut surface = RasterSurface::new(None);
        surface.clear(Size::new(10.0, 10.0));
        surface.fill_rect(Rect::new(-5.0, -5.0, 0.0, 0.0), Color::WHITE, 0.5);
        surface.stroke_rect(Rect::new(50.0, 50.0, 0.0, 0.0), Color::WHITE, 2.0);
        surface.draw_label(Point::new(-20.0, 100.0), "Text 0.50", Color::WHITE, Color::WHITE);
    }

    #[test]
    fn test_chip_only_label_sits_above_box() {
        let bg = Color::rgb(0, 128, 255);
        let mut surface = RasterSurface::new(None);
        surface.clear(Size::new(100.0, 100.0));
        surface.draw_label(Point::new(20.0, 50.0), "Title 0.90", bg, Color::WHITE);

        let img = surface.image();
        assert_eq!(*img.get_pixel(21, 50 - CHIP_ONLY_HEIGHT), rgba(bg));
        assert_eq!(*img.get_pixel(21, 51), BACKGROUND);
    }

    #[test]
    fn test_chip_only_label_inside_at_top_edge() {
        let bg = Color::rgb(0, 128, 255);
        let mut surface = RasterSurface::new(None);
        surface.clear(Size::new(100.0, 100.0));
        surface.draw_label(Point::new(0.0, 0.0), "Title 0.90", bg, Color::WHITE);
        assert_eq!(*surface.image().get_pixel(1, 1), rgba(bg));
    }

    #[test]
    fn test_render_twice_gives_identical_pixels() {
        let dets = one_detection();
        let mapper = CoordinateMapper::new(Size::new(800.0, 600.0), Size::new(400.0, 300.0)).unwrap();
        let img = page(800, 600);

        let mut surface = RasterSurface::new(None);
        render(&mut surface, &img, &dets, None, &mapper);
        let first = surface.image().clone();
        render(&mut surface, &img, &dets, None, &mapper);
        assert_eq!(first.as_raw(), surface.image().as_raw());
    }

    #[test]
    fn test_missing_explicit_font_is_error() {
        let err = load_font(Some(Path::new("/nonexistent/font.ttf"))).unwrap_err();
        assert!(matches!(err, ReviewError::Io(_)));
    }
}
