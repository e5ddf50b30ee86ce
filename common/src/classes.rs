//! クラス名 → 表示色テーブル
//!
//! DocLayNet系のレイアウトクラスに固定色を割り当てる。
//! 未知のクラスはすべて同じグレーになる。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#rrggbb`
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

pub const DEFAULT_CLASS_COLOR: Color = Color::rgb(128, 128, 128);

const CLASS_COLORS: &[(&str, Color)] = &[
    ("Caption", Color::rgb(0xe6, 0x19, 0x4b)),
    ("Footnote", Color::rgb(0x3c, 0xb4, 0x4b)),
    ("Formula", Color::rgb(0xff, 0xa5, 0x00)),
    ("List-item", Color::rgb(0x43, 0x63, 0xd8)),
    ("Page-footer", Color::rgb(0xf5, 0x82, 0x31)),
    ("Page-header", Color::rgb(0x91, 0x1e, 0xb4)),
    ("Picture", Color::rgb(0x42, 0xd4, 0xf4)),
    ("Section-header", Color::rgb(0xf0, 0x32, 0xe6)),
    ("Table", Color::rgb(0x46, 0x99, 0x90)),
    ("Text", Color::rgb(0x00, 0x80, 0x80)),
    ("Title", Color::rgb(0xdc, 0x14, 0x3c)),
];

/// クラス名から表示色を決定する（大文字小文字は区別しない）
pub fn class_color(class_name: &str) -> Color {
    CLASS_COLORS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(class_name))
        .map(|(_, color)| *color)
        .unwrap_or(DEFAULT_CLASS_COLOR)
}

/// 既知のクラス名一覧（テーブル順）
pub fn known_classes() -> impl Iterator<Item = &'static str> {
    CLASS_COLORS.iter().map(|(name, _)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_class_color() {
        assert_eq!(class_color("Title"), Color::rgb(0xdc, 0x14, 0x3c));
        assert_eq!(class_color("title"), class_color("Title"));
    }

    #[test]
    fn test_unknown_class_is_gray() {
        assert_eq!(class_color("Handwriting"), DEFAULT_CLASS_COLOR);
        assert_eq!(class_color(""), DEFAULT_CLASS_COLOR);
    }

    #[test]
    fn test_known_classes_have_distinct_colors() {
        let colors: std::collections::HashSet<Color> = known_classes().map(class_color).collect();
        assert_eq!(colors.len(), known_classes().count());
        assert!(!colors.contains(&DEFAULT_CLASS_COLOR));
    }

    #[test]
    fn test_to_hex() {
        assert_eq!(DEFAULT_CLASS_COLOR.to_hex(), "#808080");
    }
}
