//! アノテーション描画
//!
//! ページ画像と検出枠を描画面（[`Surface`]）へ描く。描画は入力だけの関数で、
//! 同じ入力なら何度呼んでも同じ結果になる。毎回まず全体をクリアする。
//!
//! 描画順:
//! 1. ページ画像
//! 2. 検出ごとに 塗り（クラス色10%）→ 枠線（通常2px / 選択中3px）→ ラベル

pub mod raster;

use image::RgbaImage;
use layout_review_common::{AnnotatedDetection, Color, CoordinateMapper, DetectionId, Point, Rect, Size, Viewport};

pub use raster::{load_font, RasterSurface};

pub const FILL_OPACITY: f32 = 0.1;
pub const BORDER_WIDTH: f32 = 2.0;
pub const SELECTED_BORDER_WIDTH: f32 = 3.0;
pub const LABEL_TEXT_COLOR: Color = Color::WHITE;

/// 描画先
pub trait Surface {
    /// 全体を消去してサイズを合わせる
    fn clear(&mut self, size: Size);

    fn draw_page(&mut self, page: &RgbaImage, dest: Rect);

    fn fill_rect(&mut self, rect: Rect, color: Color, opacity: f32);

    fn stroke_rect(&mut self, rect: Rect, color: Color, width: f32);

    /// `anchor` はラベルを付ける枠の左上
    fn draw_label(&mut self, anchor: Point, text: &str, background: Color, foreground: Color);
}

/// 1ページ分を描画する
///
/// `detections` は表示中ページの分だけを渡すこと。
pub fn render<'a, S, I>(
    surface: &mut S,
    page: &RgbaImage,
    detections: I,
    selected: Option<DetectionId>,
    mapper: &CoordinateMapper,
) where
    S: Surface + ?Sized,
    I: IntoIterator<Item = &'a AnnotatedDetection>,
{
    let display = mapper.display_size();
    surface.clear(display);
    surface.draw_page(page, Rect::new(0.0, 0.0, display.width, display.height));

    for det in detections {
        let rect = mapper.bbox_to_display(&det.detection.bbox);
        let width = if Some(det.id) == selected {
            SELECTED_BORDER_WIDTH
        } else {
            BORDER_WIDTH
        };

        surface.fill_rect(rect, det.color, FILL_OPACITY);
        surface.stroke_rect(rect, det.color, width);
        surface.draw_label(rect.origin(), &det.label(), det.color, LABEL_TEXT_COLOR);
    }
}

/// ナチュラル座標の点に当たる最初の検出（リスト順）
pub fn hit_test<'a, I>(detections: I, natural: Point) -> Option<DetectionId>
where
    I: IntoIterator<Item = &'a AnnotatedDetection>,
{
    detections
        .into_iter()
        .find(|det| det.detection.bbox.contains(natural))
        .map(|det| det.id)
}

/// 表示座標のクリック位置で当たり判定
pub fn hit_test_display<'a, I>(detections: I, mapper: &CoordinateMapper, display: Point) -> Option<DetectionId>
where
    I: IntoIterator<Item = &'a AnnotatedDetection>,
{
    hit_test(detections, mapper.display_to_natural(display))
}

/// ズーム・パンを適用して下位の描画面へ流す
///
/// 表示座標での描画結果をそのまま拡大・移動する。クリア範囲は変えない。
pub struct ViewportSurface<'s, S: Surface + ?Sized> {
    inner: &'s mut S,
    viewport: Viewport,
}

impl<'s, S: Surface + ?Sized> ViewportSurface<'s, S> {
    pub fn new(inner: &'s mut S, viewport: Viewport) -> Self {
        Self { inner, viewport }
    }
}

impl<S: Surface + ?Sized> Surface for ViewportSurface<'_, S> {
    fn clear(&mut self, size: Size) {
        self.inner.clear(size);
    }

    fn draw_page(&mut self, page: &RgbaImage, dest: Rect) {
        self.inner.draw_page(page, self.viewport.rect_to_screen(&dest));
    }

    fn fill_rect(&mut self, rect: Rect, color: Color, opacity: f32) {
        self.inner.fill_rect(self.viewport.rect_to_screen(&rect), color, opacity);
    }

    fn stroke_rect(&mut self, rect: Rect, color: Color, width: f32) {
        self.inner.stroke_rect(self.viewport.rect_to_screen(&rect), color, width);
    }

    fn draw_label(&mut self, anchor: Point, text: &str, background: Color, foreground: Color) {
        self.inner
            .draw_label(self.viewport.display_to_screen(anchor), text, background, foreground);
    }
}
