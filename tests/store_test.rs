//! 結果保存ファイルのテスト
//!
//! JSONファイル保存先の読み書き・重複判定・形式を検証

use layout_review::error::ReviewError;
use layout_review::store::{FallbackPolicy, JsonFileStore, ResultStore};
use layout_review_common::{BBox, Detection, ImageSize, RecordBody, ResultRecord, StoreFile, UatStatus};
use tempfile::tempdir;

fn create_test_record(id: &str, name: &str) -> ResultRecord {
    ResultRecord::new(
        id,
        RecordBody {
            image_name: name.to_string(),
            image_data: "data:image/jpeg;base64,/9j/4AAQ".to_string(),
            image_size: ImageSize { width: 800, height: 600 },
            detections: vec![Detection {
                class_id: 10,
                class_name: "Title".to_string(),
                confidence: 0.9,
                bbox: BBox::new(10.0, 10.0, 100.0, 20.0),
                page: None,
            }],
            uat_status: UatStatus::Pass,
            uat_note: "テスト".to_string(),
            is_pdf: None,
            total_pages: None,
            timestamp: "2026-01-18T09:00:00+00:00".to_string(),
        },
    )
    .expect("レコード作成失敗")
}

/// 保存と一覧
#[tokio::test]
async fn test_save_and_list() {
    let dir = tempdir().expect("Failed to create temp dir");
    let store = JsonFileStore::open(dir.path().join("results.json"), FallbackPolicy::PrimaryOnly).unwrap();

    let outcome = store.save(create_test_record("r1", "a.jpg")).await.expect("保存失敗");
    assert_eq!(outcome.total_results, 1);
    let outcome = store.save(create_test_record("r2", "b.jpg")).await.expect("保存失敗");
    assert_eq!(outcome.total_results, 2);

    let file = store.list().await.unwrap();
    assert_eq!(file.len(), 2);
    assert!(file.last_updated.is_some());
    assert_eq!(file.results[0].body.detections[0].class_name, "Title");
}

/// 重複保存は Conflict で、ファイルは変わらない
#[tokio::test]
async fn test_duplicate_name_conflict() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("results.json");
    let store = JsonFileStore::open(path.clone(), FallbackPolicy::PrimaryOnly).unwrap();

    store.save(create_test_record("r1", "Scan.PNG")).await.unwrap();
    let before = std::fs::read_to_string(&path).unwrap();

    let err = store.save(create_test_record("r2", "scan.png")).await.unwrap_err();
    assert!(matches!(err, ReviewError::Conflict(name) if name == "scan.png"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
}

/// 全削除
#[tokio::test]
async fn test_clear() {
    let dir = tempdir().expect("Failed to create temp dir");
    let store = JsonFileStore::open(dir.path().join("results.json"), FallbackPolicy::PrimaryOnly).unwrap();

    store.save(create_test_record("r1", "a.jpg")).await.unwrap();
    store.clear().await.unwrap();

    let file = store.list().await.unwrap();
    assert!(file.is_empty());
    // 削除後も同名で保存できる
    store.save(create_test_record("r2", "a.jpg")).await.unwrap();
}

/// ファイル形式: `{ results: [...], lastUpdated }`、レコードはcamelCase
#[tokio::test]
async fn test_file_format() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("results.json");
    let store = JsonFileStore::open(path.clone(), FallbackPolicy::PrimaryOnly).unwrap();
    store.save(create_test_record("r1", "a.jpg")).await.unwrap();

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let record = &json["results"][0];
    assert_eq!(record["id"], "r1");
    assert_eq!(record["imageName"], "a.jpg");
    assert_eq!(record["uatStatus"], "pass");
    assert_eq!(record["imageSize"]["width"], 800);
    assert_eq!(record["detections"][0]["bbox"], serde_json::json!([10.0, 10.0, 100.0, 20.0]));
    assert!(record.get("isPDF").is_none());
    assert!(json["lastUpdated"].is_string());
}

/// 既存ファイル（別ツールが書いたもの）を読める
#[tokio::test]
async fn test_reads_existing_file() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("results.json");
    std::fs::write(
        &path,
        r#"{"results": [{"id": "x1", "imageName": "doc.pdf", "imageData": "", "imageSize": {"width": 1224, "height": 1584},
            "detections": [{"class_id": 8, "class_name": "Table", "confidence": 0.7, "bbox": [1, 2, 3, 4], "page": 2}],
            "uatStatus": "fail", "uatNote": "", "isPDF": true, "totalPages": 3, "timestamp": "2025-12-01T00:00:00Z"}],
            "lastUpdated": "2025-12-01T00:00:00Z"}"#,
    )
    .unwrap();

    let store = JsonFileStore::open(path, FallbackPolicy::PrimaryOnly).unwrap();
    let file: StoreFile = store.list().await.unwrap();
    assert_eq!(file.len(), 1);
    assert_eq!(file.results[0].body.is_pdf, Some(true));
    assert_eq!(file.results[0].body.detections[0].page, Some(2));
    assert!(file.contains_name("DOC.PDF"));
}
