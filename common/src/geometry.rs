//! 座標変換モジュール
//!
//! 2つの座標系を扱う:
//! - ナチュラル座標: バックエンドが返すbboxの座標系（元画像/ラスタ済みページのピクセル）
//! - 表示座標: 現在描画しているキャンバスのピクセル
//!
//! ズーム・パンは表示座標の上に重ねる見た目だけの変換で、[`crate::viewport`] が担当する。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::BBox;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn from_pixels(width: u32, height: u32) -> Self {
        Self::new(width as f64, height as f64)
    }

    /// 幅・高さがともに正の有限値か
    pub fn is_measurable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// 表示座標の矩形
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// 画像サイズ未確定（幅または高さが0）のため変換できない
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("coordinate mapper is not ready: natural or display size is empty")]
pub struct NotReady;

/// ナチュラル座標 ⇔ 表示座標の変換
///
/// X軸とY軸は独立にスケールする。キャンバスの実寸は整数丸めで
/// 元画像のアスペクト比とわずかにずれるため、比率を揃えてはいけない。
///
/// 表示サイズ・ズーム・ページが変わるたびに作り直すこと。キャッシュした
/// マッパーで逆変換するとクリック位置がずれる。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    natural: Size,
    display: Size,
    scale_x: f64,
    scale_y: f64,
}

impl CoordinateMapper {
    pub fn new(natural: Size, display: Size) -> Result<Self, NotReady> {
        if !natural.is_measurable() || !display.is_measurable() {
            return Err(NotReady);
        }

        Ok(Self {
            natural,
            display,
            scale_x: display.width / natural.width,
            scale_y: display.height / natural.height,
        })
    }

    pub fn natural_size(&self) -> Size {
        self.natural
    }

    pub fn display_size(&self) -> Size {
        self.display
    }

    pub fn scale_x(&self) -> f64 {
        self.scale_x
    }

    pub fn scale_y(&self) -> f64 {
        self.scale_y
    }

    pub fn natural_to_display(&self, p: Point) -> Point {
        Point::new(p.x * self.scale_x, p.y * self.scale_y)
    }

    pub fn display_to_natural(&self, p: Point) -> Point {
        Point::new(p.x / self.scale_x, p.y / self.scale_y)
    }

    /// bboxを表示座標へ。元のbboxは変更しない
    pub fn bbox_to_display(&self, bbox: &BBox) -> Rect {
        Rect::new(
            bbox.x * self.scale_x,
            bbox.y * self.scale_y,
            bbox.width * self.scale_x,
            bbox.height * self.scale_y,
        )
    }

    pub fn rect_to_natural(&self, rect: &Rect) -> BBox {
        BBox::new(
            rect.x / self.scale_x,
            rect.y / self.scale_y,
            rect.width / self.scale_x,
            rect.height / self.scale_y,
        )
    }
}

/// コンテナに収まる表示サイズを計算（アスペクト比維持、整数ピクセルに丸め）
///
/// 高さに制限がない場合は `container.height` に `f64::INFINITY` を渡す。
pub fn fit_to_container(natural: Size, container: Size) -> Option<Size> {
    if !natural.is_measurable() || !(container.width > 0.0 && container.height > 0.0) {
        return None;
    }

    let scale = (container.width / natural.width).min(container.height / natural.height);
    if !scale.is_finite() {
        return None;
    }

    Some(Size::new(
        (natural.width * scale).round().max(1.0),
        (natural.height * scale).round().max(1.0),
    ))
}
