use clap::{Parser, Subcommand};
use layout_review_common::UatStatus;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "layout-review")]
#[command(about = "レイアウト検出結果のレビューツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 画像/PDFを検出にかけ、アノテーション画像とJSONを出力
    Review {
        /// 画像またはPDFファイル
        #[arg(required = true)]
        file: PathBuf,

        /// 出力ディレクトリ（デフォルト: カレント）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 信頼度の閾値 (0〜1)
        #[arg(short, long)]
        confidence: Option<f64>,

        /// IoU閾値 (0〜1)
        #[arg(long)]
        iou: Option<f64>,

        /// 出力JSONと保存に記録する判定 (pass/fail)。省略時は pass
        #[arg(long, default_value = "pass")]
        status: UatStatus,

        /// 判定を結果ファイル（または保存API）に保存する
        #[arg(long)]
        save: bool,

        /// 判定メモ
        #[arg(long, default_value = "")]
        note: String,

        /// アノテーション画像のズーム倍率
        #[arg(long)]
        zoom: Option<f64>,

        /// 表示幅（px）。省略時は設定値
        #[arg(long)]
        width: Option<u32>,

        /// アノテーション画像を出力しない
        #[arg(long)]
        no_render: bool,
    },

    /// バックエンドの状態を表示
    Status {
        /// 状態の変化を監視し続ける（Ctrl-Cで終了）
        #[arg(short, long)]
        watch: bool,
    },

    /// 保存済み結果の管理
    Results {
        #[command(subcommand)]
        action: ResultsAction,
    },

    /// 設定を表示/編集
    Config {
        /// バックエンドURLを設定
        #[arg(long)]
        set_backend_url: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}

#[derive(Subcommand)]
pub enum ResultsAction {
    /// 一覧を表示
    List,

    /// IDを指定して削除
    Delete {
        #[arg(required = true)]
        id: String,
    },

    /// すべて削除
    Clear,
}
