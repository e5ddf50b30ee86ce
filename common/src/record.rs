//! 保存・エクスポート用レコード
//!
//! 保存ファイル形式: `{ "results": [ResultRecord...], "lastUpdated": "..." }`
//! エクスポート形式: ResultRecord から `id` を除いたもの（= [`RecordBody`]）

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Detection;

/// UAT判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UatStatus {
    Pass,
    Fail,
}

impl std::str::FromStr for UatStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pass" | "ok" => Ok(UatStatus::Pass),
            "fail" | "ng" => Ok(UatStatus::Fail),
            _ => Err(format!("Unknown status: {}. Use pass or fail", s)),
        }
    }
}

impl std::fmt::Display for UatStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UatStatus::Pass => write!(f, "pass"),
            UatStatus::Fail => write!(f, "fail"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// レコード本体（エクスポートJSONそのもの）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordBody {
    pub image_name: String,

    /// Data URL（`data:image/png;base64,...`）
    pub image_data: String,

    pub image_size: ImageSize,

    pub detections: Vec<Detection>,

    pub uat_status: UatStatus,

    #[serde(default)]
    pub uat_note: String,

    #[serde(rename = "isPDF", default, skip_serializing_if = "Option::is_none")]
    pub is_pdf: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,

    /// RFC 3339
    pub timestamp: String,
}

/// 保存済みレコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: String,

    #[serde(flatten)]
    pub body: RecordBody,
}

impl ResultRecord {
    pub fn new(id: impl Into<String>, body: RecordBody) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::InvalidRecord("idが空です".into()));
        }
        if body.image_name.trim().is_empty() {
            return Err(Error::InvalidRecord("imageNameが空です".into()));
        }
        Ok(Self { id, body })
    }

    pub fn image_name(&self) -> &str {
        &self.body.image_name
    }
}

/// 保存ファイル全体
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreFile {
    #[serde(default)]
    pub results: Vec<ResultRecord>,

    #[serde(default)]
    pub last_updated: Option<String>,
}

impl StoreFile {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// 画像名の重複判定（大文字小文字を区別しない）
    pub fn contains_name(&self, image_name: &str) -> bool {
        let needle = image_name.to_lowercase();
        self.results.iter().any(|r| r.image_name().to_lowercase() == needle)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// エクスポートファイル名 `{stem}_detections.json`
pub fn export_file_name(image_name: &str) -> String {
    let base = image_name.rsplit(['/', '\\']).next().unwrap_or(image_name);
    let stem = match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    };
    let stem = if stem.is_empty() { "result" } else { stem };
    format!("{}_detections.json", stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BBox;

    fn body(name: &str) -> RecordBody {
        RecordBody {
            image_name: name.to_string(),
            image_data: "data:image/png;base64,AAAA".to_string(),
            image_size: ImageSize { width: 800, height: 600 },
            detections: vec![Detection {
                class_id: 10,
                class_name: "Title".to_string(),
                confidence: 0.9,
                bbox: BBox::new(10.0, 10.0, 100.0, 20.0),
                page: None,
            }],
            uat_status: UatStatus::Pass,
            uat_note: "OK".to_string(),
            is_pdf: None,
            total_pages: None,
            timestamp: "2026-10-18T09:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_record_shape() {
        let record = ResultRecord::new("abc", body("page.jpg")).unwrap();
        let json = serde_json::to_value(&record).expect("シリアライズ失敗");

        assert_eq!(json["id"], "abc");
        assert_eq!(json["imageName"], "page.jpg");
        assert_eq!(json["imageSize"]["width"], 800);
        assert_eq!(json["uatStatus"], "pass");
        assert_eq!(json["uatNote"], "OK");
        assert!(json.get("isPDF").is_none());
        assert_eq!(json["detections"][0]["bbox"][2], 100.0);
    }

    #[test]
    fn test_pdf_record_flags() {
        let mut b = body("doc.pdf");
        b.is_pdf = Some(true);
        b.total_pages = Some(2);
        let json = serde_json::to_value(ResultRecord::new("x", b).unwrap()).unwrap();
        assert_eq!(json["isPDF"], true);
        assert_eq!(json["totalPages"], 2);
    }

    #[test]
    fn test_export_body_has_no_id() {
        let json = serde_json::to_value(body("page.jpg")).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["imageName"], "page.jpg");
    }

    #[test]
    fn test_record_rejects_empty_name() {
        assert!(ResultRecord::new("abc", body("  ")).is_err());
        assert!(ResultRecord::new("", body("a.jpg")).is_err());
    }

    #[test]
    fn test_contains_name_case_insensitive() {
        let store = StoreFile {
            results: vec![ResultRecord::new("1", body("Scan_01.JPG")).unwrap()],
            last_updated: None,
        };
        assert!(store.contains_name("scan_01.jpg"));
        assert!(!store.contains_name("scan_02.jpg"));
    }

    #[test]
    fn test_store_file_parse() {
        let json = r#"{"results": [], "lastUpdated": "2026-10-18T00:00:00Z"}"#;
        let store = StoreFile::from_json(json).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.last_updated.as_deref(), Some("2026-10-18T00:00:00Z"));

        assert!(StoreFile::from_json("{ invalid }").is_err());
    }

    #[test]
    fn test_export_file_name() {
        assert_eq!(export_file_name("scan.page.png"), "scan.page_detections.json");
        assert_eq!(export_file_name("dir/report.pdf"), "report_detections.json");
        assert_eq!(export_file_name("noext"), "noext_detections.json");
        assert_eq!(export_file_name(".hidden"), ".hidden_detections.json");
    }

    #[test]
    fn test_uat_status_from_str() {
        assert_eq!("PASS".parse::<UatStatus>().unwrap(), UatStatus::Pass);
        assert_eq!("fail".parse::<UatStatus>().unwrap(), UatStatus::Fail);
        assert!("maybe".parse::<UatStatus>().is_err());
    }
}
