use anyhow::{Context, Result};
use clap::Parser;
use layout_review::backend::{DetectionBackend, HttpBackend};
use layout_review::cli::{Cli, Commands, ResultsAction};
use layout_review::config::Config;
use layout_review::error::{ErrorCategory, ReviewError};
use layout_review::export;
use layout_review::raster::rasterizer_from_config;
use layout_review::render::load_font;
use layout_review::session::{Notice, Session, StatusPoller};
use layout_review::store::{AnyStore, ResultStore};
use layout_review::upload::{self, UploadPolicy};
use layout_review_common::{BackendStatus, Size, ZoomLimits};
use simplelog::{ColorChoice, LevelFilter, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    TermLogger::init(level, simplelog::Config::default(), TerminalMode::Stderr, ColorChoice::Auto)
        .context("ロガーの初期化に失敗")?;

    let config = Config::load().context("設定の読み込みに失敗")?;

    match cli.command {
        Commands::Review { file, output, confidence, iou, status, save, note, zoom, width, no_render } => {
            println!("📄 layout-review - レイアウト検出\n");

            let rasterizer = rasterizer_from_config(&config);
            let backend = Arc::new(HttpBackend::from_config(&config)?);
            let poller = StatusPoller::spawn(backend.clone(), Duration::from_secs(config.status_poll_secs));
            let mut status_rx = poller.subscribe();
            let policy = UploadPolicy { max_bytes: config.max_upload_bytes };

            let mut session = Session::new(ZoomLimits::EDITOR, policy);
            session.set_thresholds(confidence.unwrap_or(config.confidence), iou.unwrap_or(config.iou));
            session.set_container(Size::new(width.unwrap_or(config.display_width) as f64, f64::INFINITY));

            // 1. 読み込み
            println!("[1/3] ファイルを読み込み中...");
            let uploaded = upload::read_upload(&file, &policy).await?;
            if uploaded.is_pdf() && !rasterizer.supports_pdf() {
                log::warn!("pdfium なしでビルドされているためPDFは読み込めません");
            }
            session
                .load(&rasterizer, uploaded.name(), uploaded.bytes().to_vec())
                .await
                .with_context(|| format!("{} を読み込めません", file.display()))?;
            println!("✔ {} ({}ページ)\n", uploaded.name(), session.page_count());

            // 2. 検出
            println!("[2/3] 検出中... (confidence={}, iou={})", session.thresholds().confidence, session.thresholds().iou);
            // 初回の死活確認を待ってから反映する
            let first_check_pending = *status_rx.borrow() == BackendStatus::Unknown;
            if first_check_pending && status_rx.changed().await.is_err() {
                log::warn!("status poller stopped before the first check");
            }
            session.observe_status(&mut status_rx);
            session.detect(&*backend).await?;

            if let Some(notice) = session.notice() {
                println!("✔ {}", notice);
            }
            print_summary(&session);

            // 3. 出力
            println!("\n[3/3] 出力中...");
            let output_dir = output.unwrap_or_else(|| PathBuf::from("."));
            let body = session.record_body(status, &note)?;
            let json_path = export::write_json(&body, &output_dir)?;
            println!("✔ JSON出力: {}", json_path.display());

            if !no_render {
                if let Some(zoom) = zoom {
                    session.set_zoom(zoom);
                }
                let font = load_font(config.font_path.as_deref())?;
                for path in export::write_annotated_pages(&session, font, &output_dir)? {
                    println!("✔ 画像出力: {}", path.display());
                }
            }

            if save {
                if matches!(session.notice(), Some(Notice::NoDetections)) {
                    println!("検出結果がないため保存しません");
                } else {
                    let store = AnyStore::from_config(&config)?;
                    match session.save(&store, status, &note).await {
                        Ok(outcome) => println!("✔ 保存しました: {} (計{}件)", store.describe(), outcome.total_results),
                        Err(e) if e.category() == ErrorCategory::Conflict => {
                            println!("⚠ {}", e);
                            println!("  既存の結果を削除してから保存してください（results delete <id>）");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }

            println!("\n✅ 完了");
        }

        Commands::Status { watch } => {
            let backend = Arc::new(HttpBackend::from_config(&config)?);
            println!("バックエンド: {}", backend.base_url());

            match backend.health().await {
                Ok(()) => println!("  状態: {}", BackendStatus::Connected),
                Err(e) => println!("  状態: {} ({})", BackendStatus::Disconnected, e),
            }

            match backend.model_info().await {
                Ok(info) => {
                    println!("  モデル読込: {}", if info.model_loaded { "済み" } else { "未" });
                    if let Some(model_type) = &info.model_type {
                        println!("  モデル種別: {}", model_type);
                    }
                    if let Some(path) = &info.model_path {
                        println!("  モデルパス: {}", path);
                    }
                    let classes = info.class_name_list();
                    println!("  クラス数: {}", info.num_classes.unwrap_or(classes.len() as u32));
                    if !classes.is_empty() {
                        println!("  クラス: {}", classes.join(", "));
                    }
                }
                Err(e) => log::debug!("model info unavailable: {}", e),
            }

            if watch {
                println!("\n監視中... (Ctrl-Cで終了)");
                let mut poller = StatusPoller::spawn(backend, Duration::from_secs(config.status_poll_secs));
                loop {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => break,
                        status = poller.changed() => match status {
                            Some(status) => println!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), status),
                            None => break,
                        },
                    }
                }
            }
        }

        Commands::Results { action } => {
            let store = AnyStore::from_config(&config)?;

            match action {
                ResultsAction::List => {
                    let file = store.list().await?;
                    println!("保存先: {}", store.describe());
                    if file.is_empty() {
                        println!("保存済みの結果はありません");
                    }
                    for record in &file.results {
                        println!(
                            "  {}  {:<32} {:<4} {:>4}件  {}",
                            record.id,
                            record.image_name(),
                            record.body.uat_status,
                            record.body.detections.len(),
                            record.body.timestamp
                        );
                    }
                    if let Some(updated) = &file.last_updated {
                        println!("最終更新: {}", updated);
                    }
                }
                ResultsAction::Delete { id } => match store.delete(&id).await {
                    Ok(true) => println!("✔ 削除しました: {}", id),
                    Ok(false) => println!("該当する結果がありません: {}", id),
                    Err(e @ ReviewError::Unsupported(_)) => println!("{}（results clear を使ってください）", e),
                    Err(e) => return Err(e.into()),
                },
                ResultsAction::Clear => {
                    store.clear().await?;
                    println!("✔ すべての結果を削除しました");
                }
            }
        }

        Commands::Config { set_backend_url, show } => {
            let mut config = config;

            if let Some(url) = set_backend_url {
                config.set_backend_url(url)?;
                println!("✔ バックエンドURLを設定しました");
            }

            if show {
                println!("設定:");
                println!("  バックエンド: {}", config.backend_url);
                println!("  アップロード上限: {} bytes", config.max_upload_bytes);
                println!("  閾値: confidence={} iou={}", config.confidence, config.iou);
                println!("  状態確認間隔: {}秒", config.status_poll_secs);
                println!("  ラスタ倍率: {}", config.render_scale);
                match &config.results_api_url {
                    Some(url) => println!("  保存先: {}", url),
                    None => println!("  保存先: {}", config.resolved_results_path()?.display()),
                }
            }
        }
    }

    Ok(())
}

fn print_summary(session: &Session) {
    let summary = session.class_summary();
    if summary.all_pages.is_empty() {
        return;
    }

    if session.page_count() > 1 {
        println!("  全{}ページ:", session.page_count());
    }
    for (class, count) in &summary.all_pages {
        let on_page = summary.current_page.get(class).copied().unwrap_or(0);
        if session.page_count() > 1 {
            println!("    {:<16} {:>4} (p{}: {})", class, count, session.current_page(), on_page);
        } else {
            println!("    {:<16} {:>4}", class, count);
        }
    }
}
