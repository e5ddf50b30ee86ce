use image::{ImageFormat, RgbImage};
use layout_review::backend::{DetectionBackend, HttpBackend};
use layout_review::upload::{self, UploadPolicy};
use layout_review_common::Thresholds;
use std::io::Cursor;
use std::time::Duration;

/// 実バックエンドに対する疎通テスト（LAYOUT_REVIEW_BACKEND_URL 未設定ならスキップ）
#[tokio::test]
async fn backend_detect_integration() {
    let base_url = match std::env::var("LAYOUT_REVIEW_BACKEND_URL") {
        Ok(url) if !url.trim().is_empty() => url,
        _ => {
            eprintln!("LAYOUT_REVIEW_BACKEND_URL not set; skipping integration test");
            return;
        }
    };

    let backend = HttpBackend::new(&base_url, Duration::from_secs(60)).expect("client build failed");
    backend.health().await.expect("backend not reachable");

    let info = backend.model_info().await.expect("model info failed");
    println!("model loaded: {}, classes: {:?}", info.model_loaded, info.class_name_list());

    let mut bytes = Vec::new();
    RgbImage::from_pixel(320, 240, image::Rgb([255, 255, 255]))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    let file = upload::validate("integration-test.png", bytes, &UploadPolicy::default()).unwrap();

    let response = backend
        .detect(&file, Thresholds::new(0.25, 0.45))
        .await
        .expect("detect request failed");

    let batch = response.into_batch();
    assert!(!batch.multi_page);
    for det in &batch.detections {
        assert!((0.0..=1.0).contains(&det.confidence));
    }
}
