//! ズーム・パン
//!
//! 表示座標の上に重ねる見た目だけの変換。保存されている検出座標には一切触れない。
//!
//! `screen = display * zoom + pan`

use crate::geometry::{Point, Rect};

/// ズーム範囲と刻み幅
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomLimits {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ZoomLimits {
    /// 検出画面
    pub const EDITOR: ZoomLimits = ZoomLimits { min: 0.25, max: 3.0, step: 0.25 };

    /// 結果ビューア
    pub const VIEWER: ZoomLimits = ZoomLimits { min: 0.25, max: 5.0, step: 0.25 };

    /// 範囲内に収め、刻み幅に丸める
    pub fn normalize(&self, zoom: f64) -> f64 {
        if !zoom.is_finite() {
            return 1.0_f64.clamp(self.min, self.max);
        }
        let snapped = (zoom / self.step).round() * self.step;
        snapped.clamp(self.min, self.max)
    }
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self::EDITOR
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    zoom: f64,
    pan: Point,
    limits: ZoomLimits,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(ZoomLimits::EDITOR)
    }
}

impl Viewport {
    pub fn new(limits: ZoomLimits) -> Self {
        Self { zoom: 1.0, pan: Point::default(), limits }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn pan(&self) -> Point {
        self.pan
    }

    pub fn limits(&self) -> ZoomLimits {
        self.limits
    }

    /// 値が変わった場合のみ true
    pub fn set_zoom(&mut self, zoom: f64) -> bool {
        let next = self.limits.normalize(zoom);
        let changed = next != self.zoom;
        self.zoom = next;
        changed
    }

    pub fn zoom_in(&mut self) -> bool {
        self.set_zoom(self.zoom + self.limits.step)
    }

    pub fn zoom_out(&mut self) -> bool {
        self.set_zoom(self.zoom - self.limits.step)
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) -> bool {
        if dx == 0.0 && dy == 0.0 {
            return false;
        }
        self.pan = Point::new(self.pan.x + dx, self.pan.y + dy);
        true
    }

    /// zoom=1, pan=(0,0) に戻す
    pub fn reset(&mut self) -> bool {
        let changed = self.zoom != 1.0 || self.pan != Point::default();
        self.zoom = 1.0;
        self.pan = Point::default();
        changed
    }

    pub fn is_identity(&self) -> bool {
        self.zoom == 1.0 && self.pan == Point::default()
    }

    pub fn display_to_screen(&self, p: Point) -> Point {
        Point::new(p.x * self.zoom + self.pan.x, p.y * self.zoom + self.pan.y)
    }

    pub fn screen_to_display(&self, p: Point) -> Point {
        Point::new((p.x - self.pan.x) / self.zoom, (p.y - self.pan.y) / self.zoom)
    }

    pub fn rect_to_screen(&self, r: &Rect) -> Rect {
        let origin = self.display_to_screen(r.origin());
        Rect::new(origin.x, origin.y, r.width * self.zoom, r.height * self.zoom)
    }
}
