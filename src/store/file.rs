//! JSONファイルによる結果保存
//!
//! ファイル全体を読み込み → 変更 → 一時ファイルに書いて rename で置き換える。
//! 同一プロセス内の読み書きは Mutex で直列化する。

use super::{ResultStore, SaveOutcome};
use crate::error::{ReviewError, Result};
use layout_review_common::{ResultRecord, StoreFile};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// 保存先に書き込めない場合の扱い（開いた時点で一度だけ判定する）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackPolicy {
    PrimaryOnly,
    FallbackTo(PathBuf),
}

#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

/// 親ディレクトリを作成し、書き込めるか確かめる
fn prepare(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    Ok(())
}

impl JsonFileStore {
    pub fn open(primary: PathBuf, policy: FallbackPolicy) -> Result<Self> {
        let path = match prepare(&primary) {
            Ok(()) => primary,
            Err(e) => match policy {
                FallbackPolicy::PrimaryOnly => return Err(e.into()),
                FallbackPolicy::FallbackTo(fallback) => {
                    log::warn!(
                        "保存先 {} に書き込めません（{}）。{} を使用します",
                        primary.display(),
                        e,
                        fallback.display()
                    );
                    prepare(&fallback)?;
                    fallback
                }
            },
        };

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<StoreFile> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreFile::default()),
            Err(e) => return Err(e.into()),
        };

        // 作成直後の空ファイル
        if content.trim().is_empty() {
            return Ok(StoreFile::default());
        }
        Ok(StoreFile::from_json(&content)?)
    }

    async fn write(&self, file: &mut StoreFile) -> Result<()> {
        file.last_updated = Some(chrono::Utc::now().to_rfc3339());
        let json = serde_json::to_string_pretty(file)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl ResultStore for JsonFileStore {
    async fn list(&self) -> Result<StoreFile> {
        let _guard = self.lock.lock().await;
        self.read().await
    }

    async fn save(&self, record: ResultRecord) -> Result<SaveOutcome> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;

        if file.contains_name(record.image_name()) {
            return Err(ReviewError::Conflict(record.image_name().to_string()));
        }

        log::info!("saved result {} ({})", record.id, record.image_name());
        file.results.push(record);
        self.write(&mut file).await?;

        Ok(SaveOutcome {
            total_results: file.len(),
        })
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let mut file = self.read().await?;

        let before = file.len();
        file.results.retain(|r| r.id != id);
        if file.len() == before {
            return Ok(false);
        }

        self.write(&mut file).await?;
        Ok(true)
    }

    async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.write(&mut StoreFile::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layout_review_common::{ImageSize, RecordBody, UatStatus};
    use tempfile::TempDir;

    fn record(id: &str, name: &str) -> ResultRecord {
        ResultRecord::new(
            id,
            RecordBody {
                image_name: name.into(),
                image_data: "data:image/png;base64,AAAA".into(),
                image_size: ImageSize { width: 10, height: 10 },
                detections: vec![],
                uat_status: UatStatus::Pass,
                uat_note: String::new(),
                is_pdf: None,
                total_pages: None,
                timestamp: "2026-01-01T00:00:00Z".into(),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_file_lists_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("nested/results.json"), FallbackPolicy::PrimaryOnly).unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_single_record() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("results.json"), FallbackPolicy::PrimaryOnly).unwrap();
        store.save(record("a", "one.png")).await.unwrap();
        store.save(record("b", "two.png")).await.unwrap();

        assert!(store.delete("a").await.unwrap());
        assert!(!store.delete("a").await.unwrap());

        let file = store.list().await.unwrap();
        assert_eq!(file.len(), 1);
        assert_eq!(file.results[0].id, "b");
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        let store = JsonFileStore::open(path.clone(), FallbackPolicy::PrimaryOnly).unwrap();
        store.save(record("a", "one.png")).await.unwrap();

        assert!(path.exists());
        assert!(!dir.path().join("results.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_fallback_when_primary_unwritable() {
        let dir = TempDir::new().unwrap();
        // 親がファイルなのでディレクトリを作れない
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        let fallback = dir.path().join("fallback/results.json");

        let store = JsonFileStore::open(blocker.join("results.json"), FallbackPolicy::FallbackTo(fallback.clone())).unwrap();
        assert_eq!(store.path(), fallback.as_path());

        let err = JsonFileStore::open(blocker.join("results.json"), FallbackPolicy::PrimaryOnly).unwrap_err();
        assert!(matches!(err, ReviewError::Io(_)));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::open(path, FallbackPolicy::PrimaryOnly).unwrap();
        assert!(store.list().await.is_err());
    }
}
