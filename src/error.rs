use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("対応していないファイル形式です: {0}（画像またはPDFを選択してください）")]
    UnsupportedFileType(String),

    #[error("ファイルサイズが上限を超えています: {size} bytes（上限 {limit} bytes）")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("バックエンドに接続できません: {0}")]
    Transport(String),

    #[error("バックエンドがエラーを返しました (HTTP {status}): {body}")]
    BackendStatus { status: u16, body: String },

    #[error("PDFとして読み込めません: {0}")]
    UnsupportedFormat(String),

    #[error("{page}ページ目のレンダリングに失敗: {reason}")]
    Rasterization { page: usize, reason: String },

    #[error("同名の結果が既に保存されています: {0}")]
    Conflict(String),

    #[error("画像のデコードに失敗: {0}")]
    Decode(String),

    #[error("画像サイズが未確定のため座標変換できません")]
    NotReady,

    #[error("現在の状態では実行できません: {0}")]
    InvalidState(String),

    #[error("保存先がこの操作に対応していません: {0}")]
    Unsupported(String),

    #[error("設定エラー: {0}")]
    Config(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] layout_review_common::Error),
}

/// エラー分類（UIでの扱いを決める）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// ネットワーク呼び出し前に弾く。ユーザーが直せる
    Validation,
    /// 状態表示に出し、再実行は手動
    Transport,
    Rasterization,
    Conflict,
    Decode,
    Internal,
}

impl ReviewError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ReviewError::UnsupportedFileType(_) | ReviewError::FileTooLarge { .. } => ErrorCategory::Validation,
            ReviewError::Transport(_) | ReviewError::BackendStatus { .. } => ErrorCategory::Transport,
            // 壊れた検出レスポンスはバックエンド側の問題として扱う
            ReviewError::Common(layout_review_common::Error::Parse(_)) => ErrorCategory::Transport,
            ReviewError::UnsupportedFormat(_) | ReviewError::Rasterization { .. } => ErrorCategory::Rasterization,
            ReviewError::Conflict(_) => ErrorCategory::Conflict,
            ReviewError::Decode(_) => ErrorCategory::Decode,
            _ => ErrorCategory::Internal,
        }
    }
}

impl From<reqwest::Error> for ReviewError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => ReviewError::BackendStatus {
                status: status.as_u16(),
                body: e.to_string(),
            },
            None => ReviewError::Transport(e.to_string()),
        }
    }
}

impl From<layout_review_common::NotReady> for ReviewError {
    fn from(_: layout_review_common::NotReady) -> Self {
        ReviewError::NotReady
    }
}

pub type Result<T> = std::result::Result<T, ReviewError>;
