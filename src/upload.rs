//! アップロード検証
//!
//! 種別（画像/PDF）とサイズ上限を、ネットワーク呼び出しより前に確認する。
//! 種別はマジックバイトで判定し、拡張子は見ない。

use crate::error::{ReviewError, Result};
use image::ImageFormat;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Pdf,
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileKind::Image => write!(f, "image"),
            FileKind::Pdf => write!(f, "pdf"),
        }
    }
}

const PDF_MAGIC: &[u8] = b"%PDF-";

const SUPPORTED_IMAGE_FORMATS: &[ImageFormat] = &[
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self { max_bytes: crate::config::DEFAULT_MAX_UPLOAD_BYTES }
    }
}

/// 検証済みのアップロードファイル（元バイト列をそのまま保持）
#[derive(Debug, Clone)]
pub struct UploadedFile {
    name: String,
    bytes: Arc<[u8]>,
    kind: FileKind,
    mime: &'static str,
}

impl UploadedFile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn is_pdf(&self) -> bool {
        self.kind == FileKind::Pdf
    }
}

pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(PDF_MAGIC)
}

/// マジックバイトから種別とMIMEを判定
pub fn sniff_kind(bytes: &[u8]) -> Option<(FileKind, &'static str)> {
    if is_pdf(bytes) {
        return Some((FileKind::Pdf, "application/pdf"));
    }

    let format = image::guess_format(bytes).ok()?;
    if SUPPORTED_IMAGE_FORMATS.contains(&format) {
        Some((FileKind::Image, format.to_mime_type()))
    } else {
        None
    }
}

fn check_size(size: u64, policy: &UploadPolicy) -> Result<()> {
    if size > policy.max_bytes {
        return Err(ReviewError::FileTooLarge {
            size,
            limit: policy.max_bytes,
        });
    }
    Ok(())
}

pub fn validate(name: &str, bytes: Vec<u8>, policy: &UploadPolicy) -> Result<UploadedFile> {
    check_size(bytes.len() as u64, policy)?;

    let (kind, mime) = sniff_kind(&bytes).ok_or_else(|| ReviewError::UnsupportedFileType(name.to_string()))?;

    Ok(UploadedFile {
        name: name.to_string(),
        bytes: bytes.into(),
        kind,
        mime,
    })
}

/// ファイルを読み込んで検証。上限超過のファイルは読み込む前に弾く
pub async fn read_upload(path: &Path, policy: &UploadPolicy) -> Result<UploadedFile> {
    let meta = tokio::fs::metadata(path).await?;
    check_size(meta.len(), policy)?;

    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    validate(&name, bytes, policy)
}
