use crate::error::{ReviewError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend_url: String,
    pub max_upload_bytes: u64,
    pub confidence: f64,
    pub iou: f64,
    pub status_poll_secs: u64,
    pub timeout_seconds: u64,
    /// 結果保存ファイル（JSON）
    pub results_path: Option<PathBuf>,
    /// 保存ファイルに書き込めない場合の代替先
    pub results_fallback_path: Option<PathBuf>,
    /// 設定時はファイルではなく保存APIを使う
    pub results_api_url: Option<String>,
    pub render_scale: f32,
    pub display_width: u32,
    pub font_path: Option<PathBuf>,
    /// pdfium 共有ライブラリの置き場所（未設定ならシステム → カレント）
    pub pdfium_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)?
        } else {
            Self::default_config()
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| ReviewError::Config("ホームディレクトリが見つかりません".into()))?;
        Ok(home.join(".config").join("layout-review").join("config.json"))
    }

    fn default_config() -> Self {
        Self {
            backend_url: "http://localhost:8000".into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            confidence: 0.25,
            iou: 0.45,
            status_poll_secs: 30,
            timeout_seconds: 120,
            results_path: None,
            results_fallback_path: None,
            results_api_url: None,
            render_scale: 2.0,
            display_width: 1200,
            font_path: None,
            pdfium_dir: None,
        }
    }

    fn apply_env(&mut self) {
        // 環境変数を優先
        if let Ok(url) = std::env::var("LAYOUT_REVIEW_BACKEND_URL") {
            if !url.trim().is_empty() {
                self.backend_url = url;
            }
        }
        if let Ok(url) = std::env::var("LAYOUT_REVIEW_RESULTS_API") {
            if !url.trim().is_empty() {
                self.results_api_url = Some(url);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend_url.trim().is_empty() {
            return Err(ReviewError::Config("backend_url が空です".into()));
        }
        if self.max_upload_bytes == 0 {
            return Err(ReviewError::Config("max_upload_bytes は1以上にしてください".into()));
        }
        if !(self.render_scale.is_finite() && self.render_scale > 0.0) {
            return Err(ReviewError::Config(format!("render_scale が不正です: {}", self.render_scale)));
        }
        if self.status_poll_secs == 0 {
            return Err(ReviewError::Config("status_poll_secs は1以上にしてください".into()));
        }
        Ok(())
    }

    /// 結果ファイルの既定パス `~/.local/share/layout-review/results.json`
    pub fn resolved_results_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.results_path {
            return Ok(path.clone());
        }
        let base = dirs::data_dir()
            .ok_or_else(|| ReviewError::Config("データディレクトリが見つかりません".into()))?;
        Ok(base.join("layout-review").join("results.json"))
    }

    pub fn set_backend_url(&mut self, url: String) -> Result<()> {
        self.backend_url = url;
        self.validate()?;
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(config.status_poll_secs, 30);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"backend_url": "http://gpu:9000"}"#).unwrap();
        assert_eq!(config.backend_url, "http://gpu:9000");
        assert_eq!(config.confidence, 0.25);
        assert_eq!(config.render_scale, 2.0);
    }

    #[test]
    fn test_invalid_render_scale() {
        let config = Config { render_scale: 0.0, ..Config::default() };
        assert!(matches!(config.validate(), Err(ReviewError::Config(_))));
    }

    #[test]
    fn test_explicit_results_path() {
        let config = Config {
            results_path: Some(PathBuf::from("/tmp/results.json")),
            ..Config::default()
        };
        assert_eq!(config.resolved_results_path().unwrap(), PathBuf::from("/tmp/results.json"));
    }
}
