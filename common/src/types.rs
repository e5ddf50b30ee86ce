//! 検出結果の型定義
//!
//! - Detection: バックエンドが返す1件の検出（不変）
//! - AnnotatedDetection: セッション内ID・表示色を付与したもの

use serde::{Deserialize, Serialize};

use crate::classes::{class_color, Color};
use crate::geometry::Point;

/// ナチュラル座標の bbox `[x, y, w, h]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BBox {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// 辺上の点も含む
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

/// バックエンドの検出結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub class_id: i64,

    pub class_name: String,

    pub confidence: f64,

    pub bbox: BBox,

    /// PDFモードのみ（1始まり）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

impl Detection {
    /// 単一画像モードでは常に1ページ目
    pub fn page_number(&self) -> u32 {
        self.page.unwrap_or(1)
    }
}

/// セッション内で一意な検出ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DetectionId(u64);

impl DetectionId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for DetectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "det-{}", self.0)
    }
}

/// 単調増加のID払い出し
///
/// セッションごとに1つ持つ。削除されたIDも再利用しない。
#[derive(Debug, Clone, Default)]
pub struct IdSequence {
    next: u64,
}

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> DetectionId {
        self.next += 1;
        DetectionId(self.next)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedDetection {
    pub id: DetectionId,
    pub detection: Detection,
    pub color: Color,
}

impl AnnotatedDetection {
    pub fn new(id: DetectionId, detection: Detection) -> Self {
        let color = class_color(&detection.class_name);
        Self { id, detection, color }
    }

    /// ラベル文字列 `"{class_name} {confidence:.2}"`
    pub fn label(&self) -> String {
        format!("{} {:.2}", self.detection.class_name, self.detection.confidence)
    }

    pub fn page_number(&self) -> u32 {
        self.detection.page_number()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_deserialize_single_image() {
        let json = r#"{"class_id": 10, "class_name": "Title", "confidence": 0.9, "bbox": [10, 10, 100, 20]}"#;
        let det: Detection = serde_json::from_str(json).expect("デシリアライズ失敗");

        assert_eq!(det.class_name, "Title");
        assert_eq!(det.bbox, BBox::new(10.0, 10.0, 100.0, 20.0));
        assert_eq!(det.page, None);
        assert_eq!(det.page_number(), 1);
    }

    #[test]
    fn test_detection_serialize_bbox_as_array() {
        let det = Detection {
            class_id: 9,
            class_name: "Text".to_string(),
            confidence: 0.5,
            bbox: BBox::new(1.0, 2.0, 3.0, 4.0),
            page: Some(2),
        };

        let json = serde_json::to_string(&det).expect("シリアライズ失敗");
        assert!(json.contains("\"bbox\":[1.0,2.0,3.0,4.0]"));
        assert!(json.contains("\"page\":2"));
    }

    #[test]
    fn test_page_omitted_when_absent() {
        let det = Detection {
            class_id: 0,
            class_name: "Caption".to_string(),
            confidence: 0.3,
            bbox: BBox::default(),
            page: None,
        };
        let json = serde_json::to_string(&det).unwrap();
        assert!(!json.contains("page"));
    }

    #[test]
    fn test_bbox_contains_edges() {
        let bbox = BBox::new(10.0, 10.0, 100.0, 20.0);
        assert!(bbox.contains(Point::new(50.0, 15.0)));
        assert!(bbox.contains(Point::new(10.0, 10.0)));
        assert!(bbox.contains(Point::new(110.0, 30.0)));
        assert!(!bbox.contains(Point::new(110.1, 30.0)));
        assert!(!bbox.contains(Point::new(500.0, 500.0)));
    }

    #[test]
    fn test_id_sequence_monotonic() {
        let mut ids = IdSequence::new();
        let a = ids.next_id();
        let b = ids.next_id();
        assert!(b > a);
        assert_eq!(a.to_string(), "det-1");
        assert_eq!(b.value(), 2);
    }

    #[test]
    fn test_annotated_label_and_color() {
        let det = Detection {
            class_id: 10,
            class_name: "Title".to_string(),
            confidence: 0.876,
            bbox: BBox::default(),
            page: None,
        };
        let annotated = AnnotatedDetection::new(IdSequence::new().next_id(), det);
        assert_eq!(annotated.label(), "Title 0.88");
        assert_eq!(annotated.color, class_color("Title"));
    }
}
